//! Long-lived connection to a Home Assistant instance.
//!
//! [`Connection::open`] spawns a supervisor task that dials, authenticates,
//! runs the read loop, and redials whenever the session drops. Commands are
//! submitted through the same handle; each submission allocates a fresh
//! identifier and registers its handler before the frame is written.
//!
//! ```rust,ignore
//! let conn = Connection::open(ConnectionConfig::new("homeassistant.local", token))?;
//! conn.wait_ready().await?;
//!
//! let reply = conn.request(GetStates::default()).await?;
//! let states: Vec<State> = reply.parse()?;
//!
//! let mut sub = conn.subscribe(Some("state_changed".into())).await?;
//! while let Some(fired) = sub.next().await {
//!     println!("{}", fired.event);
//! }
//!
//! conn.close().await;
//! ```
//!
//! Identifiers are never reused for the lifetime of a `Connection`, across
//! reconnects included. When a session drops, every outstanding handler is
//! notified once through its close capability and forgotten.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::command::{
    CallService, Command, GetConfig, GetMediaPlayerThumbnail, GetPanels, GetServices, GetStates,
    Ping, SubscribeEvents, UnsubscribeEvents,
};
use crate::config::{AuthFailurePolicy, ConnectionConfig};
use crate::dispatch::{ReadOutcome, read_loop};
use crate::error::Error;
use crate::frame::{AuthFrame, Message, MessageType, Reply};
use crate::handler::{EventForwarder, Handler, ReplySlot, Subscription};
use crate::reconnect::calculate_backoff;
use crate::registry::Registry;
use crate::transport::{Dialer, FrameSink, FrameStream, Outgoing, WebSocketDialer};

/// Events buffered per subscription before new ones are dropped.
const SUBSCRIPTION_BUFFER: usize = 64;

// ── Connection state ─────────────────────────────────────────────────

/// Lifecycle of the connection, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; between attempts or after shutdown.
    Disconnected,
    /// Dialing. `attempt` counts consecutive failures so far.
    Connecting { attempt: u32 },
    /// Socket open, handshake in progress.
    Authenticating,
    /// Authenticated; commands may be submitted.
    Ready,
    /// `close()` has been called.
    Closing,
    /// The server refused the access token under [`AuthFailurePolicy::Fatal`].
    Rejected { message: String },
    /// The supervisor gave up and will not redial.
    Failed { reason: String },
}

impl ConnectionState {
    /// Whether the supervisor stopped on its own and will not redial.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Failed { .. })
    }
}

/// How [`Connection::close`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The supervisor finished within the close timeout.
    Clean,
    /// The timeout elapsed and the session was abandoned.
    TimedOut,
}

// ── Connection ───────────────────────────────────────────────────────

/// Cloneable handle to one supervised connection.
///
/// Clones share the same session, registry and identifier counter. The
/// supervisor keeps running until [`close`](Self::close) is called or it
/// gives up, even if every handle is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    endpoint: Url,
    dialer: Arc<dyn Dialer>,
    shared: RwLock<Shared>,
    state: watch::Sender<ConnectionState>,
    /// No further dials or submissions.
    shutdown: CancellationToken,
    /// Stop reading immediately.
    abort: CancellationToken,
    /// Cancelled when the supervisor task returns.
    terminated: CancellationToken,
    handler_permits: Arc<Semaphore>,
}

/// Everything guarded by the connection lock.
struct Shared {
    /// Write half of the current session; `None` while not authenticated.
    sink: Option<FrameSink>,
    registry: Registry,
    server_version: Option<String>,
}

impl Connection {
    /// Start a supervised WebSocket connection.
    ///
    /// Returns as soon as the supervisor is spawned; use
    /// [`wait_ready`](Self::wait_ready) to wait for authentication.
    /// Must be called within a tokio runtime.
    pub fn open(config: ConnectionConfig) -> Result<Self, Error> {
        Self::with_dialer(config, Arc::new(WebSocketDialer))
    }

    /// Start a supervised connection over a custom transport.
    pub fn with_dialer(config: ConnectionConfig, dialer: Arc<dyn Dialer>) -> Result<Self, Error> {
        let endpoint = config.endpoint()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let permits = config.max_inflight_handlers.max(1);

        let conn = Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                dialer,
                shared: RwLock::new(Shared {
                    sink: None,
                    registry: Registry::new(),
                    server_version: None,
                }),
                state,
                shutdown: CancellationToken::new(),
                abort: CancellationToken::new(),
                terminated: CancellationToken::new(),
                handler_permits: Arc::new(Semaphore::new(permits)),
            }),
        };

        tokio::spawn(conn.clone().supervise());
        Ok(conn)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Wait until the connection is authenticated.
    ///
    /// Fails with [`Error::AuthRejected`] or [`Error::ConnectionFailed`] if
    /// the supervisor gives up first, or [`Error::NotConnected`] if the
    /// connection is shut down.
    pub async fn wait_ready(&self) -> Result<(), Error> {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Rejected { message } => {
                    return Err(Error::AuthRejected { message });
                }
                ConnectionState::Failed { reason } => {
                    return Err(Error::ConnectionFailed { reason });
                }
                ConnectionState::Closing => return Err(Error::NotConnected),
                ConnectionState::Disconnected if self.inner.terminated.is_cancelled() => {
                    return Err(Error::NotConnected);
                }
                _ => {}
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::NotConnected);
                    }
                }
                () = self.inner.terminated.cancelled() => {}
            }
        }
    }

    /// Resolves once the supervisor has stopped for good.
    pub async fn closed(&self) {
        self.inner.terminated.cancelled().await;
    }

    /// `ha_version` reported by the server on the latest `auth_ok`.
    pub async fn server_version(&self) -> Option<String> {
        self.inner.shared.read().await.server_version.clone()
    }

    /// Number of registered handlers.
    pub async fn pending(&self) -> usize {
        self.inner.shared.read().await.registry.len()
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Assign the next identifier to `command`, register `handler` under
    /// it, and write the frame.
    ///
    /// Allocation, registration and the write happen under one lock, so
    /// frames leave in identifier order. If serialization or the write
    /// fails the registration is rolled back; the identifier stays
    /// consumed.
    pub async fn submit<C: Command>(
        &self,
        handler: Option<Arc<dyn Handler>>,
        mut command: C,
    ) -> Result<u64, Error> {
        let mut guard = self.inner.shared.write().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::NotConnected);
        }
        let shared = &mut *guard;
        let Some(sink) = shared.sink.as_mut() else {
            return Err(Error::NotConnected);
        };

        let id = shared.registry.allocate(handler);
        command.set_id(id);

        let text = match serde_json::to_string(&command) {
            Ok(text) => text,
            Err(e) => {
                shared.registry.remove(id);
                return Err(e.into());
            }
        };

        if let Err(e) = sink.send(Outgoing::Text(text)).await {
            shared.registry.remove(id);
            tracing::warn!(id, kind = command.kind(), error = %e, "Failed to write command");
            return Err(e.into());
        }

        tracing::debug!(id, kind = command.kind(), "Command sent");
        Ok(id)
    }

    /// Forget the handler registered under `id`. Returns whether one existed.
    ///
    /// Used to stop a subscription locally; no close notification is sent.
    pub async fn remove_handler(&self, id: u64) -> bool {
        self.inner.shared.write().await.registry.remove(id).is_some()
    }

    /// Submit `command` and wait for its terminal frame.
    ///
    /// Resolves with the `result` (or a synthesized success for `pong`),
    /// or [`Error::Disconnected`] if the session drops first. A failed
    /// `result` is still `Ok`; see [`Reply::into_result`].
    pub async fn request<C: Command>(&self, command: C) -> Result<Reply, Error> {
        let (slot, rx) = ReplySlot::new();
        self.submit(Some(Arc::new(slot)), command).await?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Subscribe to events, optionally of one type, and wait for the
    /// server to acknowledge.
    pub async fn subscribe(&self, event_type: Option<String>) -> Result<Subscription, Error> {
        let (forwarder, ack, events) = EventForwarder::new(SUBSCRIPTION_BUFFER);
        let id = self
            .submit(Some(Arc::new(forwarder)), SubscribeEvents::new(event_type))
            .await?;

        let acknowledged = match ack.await {
            Ok(outcome) => outcome.and_then(Reply::into_result),
            Err(_) => Err(Error::Disconnected),
        };
        if let Err(e) = acknowledged {
            self.remove_handler(id).await;
            return Err(e);
        }

        tracing::debug!(id, "Subscription acknowledged");
        Ok(Subscription::new(id, events))
    }

    /// End a subscription on the server and drop its local registration.
    ///
    /// The local registration is removed even if the server refuses.
    pub async fn unsubscribe(&self, subscription: u64) -> Result<(), Error> {
        let outcome = self.request(UnsubscribeEvents::new(subscription)).await;
        self.remove_handler(subscription).await;
        outcome?.into_result().map(|_| ())
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Shut the connection down.
    ///
    /// Stops redialing, writes a normal close frame, and waits up to the
    /// configured close timeout for the server to end the session. On
    /// timeout the session is abandoned. Outstanding handlers receive
    /// their close notification either way.
    pub async fn close(&self) -> CloseOutcome {
        if self.inner.terminated.is_cancelled() {
            return CloseOutcome::Clean;
        }

        tracing::info!(endpoint = %self.inner.endpoint, "Closing connection");
        self.inner.shutdown.cancel();
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal_failure() {
                return false;
            }
            *state = ConnectionState::Closing;
            true
        });

        let timeout = self.inner.config.close_timeout;
        let write_close = async {
            let mut shared = self.inner.shared.write().await;
            match shared.sink.as_mut() {
                Some(sink) => sink.send(Outgoing::normal_close()).await,
                None => Ok(()),
            }
        };
        let mut stalled = false;
        match tokio::time::timeout(timeout, write_close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to write close frame");
                self.inner.abort.cancel();
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis(),
                    "Close frame write stalled, abandoning the session"
                );
                stalled = true;
                self.inner.abort.cancel();
            }
        }

        let outcome =
            match tokio::time::timeout(timeout, self.inner.terminated.cancelled()).await {
                Ok(()) if stalled => CloseOutcome::TimedOut,
                Ok(()) => CloseOutcome::Clean,
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = timeout.as_millis(),
                        "Server did not close the session in time, abandoning it"
                    );
                    self.inner.abort.cancel();
                    self.inner.terminated.cancelled().await;
                    CloseOutcome::TimedOut
                }
            };

        self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Closing {
                *state = ConnectionState::Disconnected;
                return true;
            }
            false
        });
        outcome
    }

    // ── Dispatcher hooks ─────────────────────────────────────────────

    pub(crate) async fn lookup(&self, id: u64) -> Option<Arc<dyn Handler>> {
        self.inner.shared.read().await.registry.lookup(id)
    }

    pub(crate) async fn resolve_terminal(&self, id: u64) -> Option<Arc<dyn Handler>> {
        self.inner.shared.write().await.registry.resolve_terminal(id)
    }

    /// Run `job` on the blocking pool once a handler permit is free.
    ///
    /// The read loop waits here when too many handlers are in flight.
    /// Returns `false` if the session was abandoned first and `job` was
    /// dropped without running.
    pub(crate) async fn spawn_handler<F>(&self, job: F) -> bool
    where
        F: FnOnce(&Connection) + Send + 'static,
    {
        let permits = Arc::clone(&self.inner.handler_permits);
        let permit = tokio::select! {
            biased;
            () = self.inner.abort.cancelled() => return false,
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&conn);
        });
        true
    }

    /// Deliver the close notification for `id` on the blocking pool.
    ///
    /// Callers must already have removed `id` from the registry.
    pub(crate) fn notify_close(&self, id: u64, handler: Arc<dyn Handler>) {
        let conn = self.clone();
        tokio::task::spawn_blocking(move || match handler.as_close() {
            Some(h) => h.handle_close(&conn, id),
            None => tracing::debug!(id, "Handler has no close capability"),
        });
    }

    // ── Supervisor ───────────────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        tracing::trace!(?state, "Connection state");
        self.inner.state.send_replace(state);
    }

    async fn supervise(self) {
        let _terminated = self.inner.terminated.clone().drop_guard();
        let config = &self.inner.config;
        let shutdown = &self.inner.shutdown;
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting { attempt });

            let session = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                session = self.establish() => session,
            };

            let stream = match session {
                Ok(stream) => {
                    attempt = 0;
                    stream
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Connection attempt failed");

                    if let Error::AuthRejected { message } = &e {
                        if config.auth_failure == AuthFailurePolicy::Fatal {
                            tracing::error!("Access token rejected, giving up");
                            self.set_state(ConnectionState::Rejected {
                                message: message.clone(),
                            });
                            break;
                        }
                    }

                    if config.reconnect.is_exhausted(attempt) {
                        tracing::error!(
                            attempts = attempt + 1,
                            "Retry limit reached, giving up"
                        );
                        self.set_state(ConnectionState::Failed {
                            reason: format!("gave up after {} attempts: {e}", attempt + 1),
                        });
                        break;
                    }

                    let delay = calculate_backoff(attempt, &config.reconnect);
                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt + 1,
                        "Reconnecting after backoff"
                    );
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            // close() raced the handshake; the sink is dropped below.
            if shutdown.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Ready);
            tracing::info!(endpoint = %self.inner.endpoint, "Connection ready");

            match read_loop(&self, stream, &self.inner.abort).await {
                ReadOutcome::Graceful(code) => tracing::info!(?code, "Session closed"),
                ReadOutcome::Failed(e) => tracing::warn!(error = %e, "Session lost"),
                ReadOutcome::Aborted => tracing::debug!("Session abandoned"),
            }

            self.teardown().await;

            if shutdown.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Disconnected);
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(config.cooldown) => {}
            }
        }

        self.teardown().await;
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal_failure() {
                return false;
            }
            *state = ConnectionState::Disconnected;
            true
        });
        tracing::debug!("Connection supervisor stopped");
    }

    /// Dial and authenticate; on success the sink is installed and the
    /// read half returned.
    async fn establish(&self) -> Result<FrameStream, Error> {
        let (mut sink, mut stream) = self.inner.dialer.dial(&self.inner.endpoint).await?;
        self.set_state(ConnectionState::Authenticating);

        let auth_timeout = self.inner.config.auth_timeout;
        let handshake = tokio::time::timeout(
            auth_timeout,
            authenticate(&mut sink, &mut stream, &self.inner.config.access_token),
        )
        .await;

        let ha_version = match handshake {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                close_quietly(&mut sink).await;
                return Err(e);
            }
            Err(_) => {
                close_quietly(&mut sink).await;
                return Err(Error::AuthTimeout {
                    timeout_secs: auth_timeout.as_secs(),
                });
            }
        };

        tracing::info!(
            ha_version = ha_version.as_deref().unwrap_or("unknown"),
            "Authenticated"
        );

        let mut shared = self.inner.shared.write().await;
        shared.sink = Some(sink);
        shared.server_version = ha_version;
        Ok(stream)
    }

    /// Drop the sink and notify every outstanding handler once.
    async fn teardown(&self) {
        let orphans = {
            let mut shared = self.inner.shared.write().await;
            shared.sink = None;
            shared.registry.drain()
        };

        if orphans.is_empty() {
            return;
        }
        tracing::info!(count = orphans.len(), "Notifying outstanding handlers of close");

        for (id, handler) in orphans {
            self.notify_close(id, handler);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

// ── Typed submission ─────────────────────────────────────────────────

impl Connection {
    pub async fn call_service(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Value>,
        handler: Arc<dyn Handler>,
    ) -> Result<u64, Error> {
        let command = CallService::new(domain, service, service_data);
        self.submit(Some(handler), command).await
    }

    pub async fn get_config(&self, handler: Arc<dyn Handler>) -> Result<u64, Error> {
        self.submit(Some(handler), GetConfig::default()).await
    }

    pub async fn get_states(&self, handler: Arc<dyn Handler>) -> Result<u64, Error> {
        self.submit(Some(handler), GetStates::default()).await
    }

    pub async fn get_panels(&self, handler: Arc<dyn Handler>) -> Result<u64, Error> {
        self.submit(Some(handler), GetPanels::default()).await
    }

    pub async fn get_services(&self, handler: Arc<dyn Handler>) -> Result<u64, Error> {
        self.submit(Some(handler), GetServices::default()).await
    }

    pub async fn get_media_player_thumbnail(
        &self,
        entity_id: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<u64, Error> {
        self.submit(Some(handler), GetMediaPlayerThumbnail::new(entity_id))
            .await
    }

    pub async fn ping(&self, handler: Arc<dyn Handler>) -> Result<u64, Error> {
        self.submit(Some(handler), Ping::default()).await
    }

    /// Register `handler` as a subscription; it receives the
    /// acknowledgement and then every matching event.
    pub async fn subscribe_events(
        &self,
        event_type: Option<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<u64, Error> {
        self.submit(Some(handler), SubscribeEvents::new(event_type))
            .await
    }

    pub async fn unsubscribe_events(
        &self,
        subscription: u64,
        handler: Arc<dyn Handler>,
    ) -> Result<u64, Error> {
        self.submit(Some(handler), UnsubscribeEvents::new(subscription))
            .await
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Run the auth handshake on a freshly dialed transport.
///
/// Returns the server's `ha_version` on `auth_ok`.
async fn authenticate(
    sink: &mut FrameSink,
    stream: &mut FrameStream,
    token: &SecretString,
) -> Result<Option<String>, Error> {
    loop {
        let text = match stream.next().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(Error::Handshake(
                    "connection closed during authentication".into(),
                ));
            }
        };

        let message: Message = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed frame during authentication");
                continue;
            }
        };

        match message.message_type() {
            MessageType::AuthRequired => {
                tracing::debug!(
                    ha_version = message.ha_version.as_deref().unwrap_or("unknown"),
                    "Server requested authentication"
                );
                let frame = serde_json::to_string(&AuthFrame::new(token))?;
                sink.send(Outgoing::Text(frame)).await?;
            }
            MessageType::AuthOk => return Ok(message.ha_version),
            MessageType::AuthInvalid => {
                return Err(Error::AuthRejected {
                    message: message
                        .message
                        .unwrap_or_else(|| "invalid access token".into()),
                });
            }
            _ => {
                tracing::debug!(kind = %message.kind, "Ignoring frame before authentication");
            }
        }
    }
}

async fn close_quietly(sink: &mut FrameSink) {
    if let Err(e) = sink.send(Outgoing::normal_close()).await {
        tracing::debug!(error = %e, "Close frame not delivered");
    }
}
