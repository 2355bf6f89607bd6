// In-process transport backed by tokio channels.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture};
use futures_util::Sink;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use super::{Dialer, FrameSink, FrameStream, Outgoing, TransportError};

/// A [`Dialer`] that never opens a socket.
///
/// Every successful dial produces a fresh [`ServerEnd`] on the receiver
/// returned by [`MemoryDialer::new`], letting a test play the server side
/// of each generation. Dropping a `ServerEnd` ends the client's stream
/// the same way a close without status would.
#[derive(Debug, Clone)]
pub struct MemoryDialer {
    sessions: mpsc::UnboundedSender<ServerEnd>,
    refusals: Arc<AtomicU32>,
    dials: Arc<AtomicU32>,
}

/// Server half of one in-memory transport.
#[derive(Debug)]
pub struct ServerEnd {
    url: Url,
    from_client: mpsc::UnboundedReceiver<Outgoing>,
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    stalled: Arc<AtomicBool>,
}

impl MemoryDialer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (sessions, accepted) = mpsc::unbounded_channel();
        let dialer = Self {
            sessions,
            refusals: Arc::new(AtomicU32::new(0)),
            dials: Arc::new(AtomicU32::new(0)),
        };
        (dialer, accepted)
    }

    /// Fail the next `count` dial attempts with a connection error.
    pub fn refuse_next(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Total dial attempts so far, refused ones included.
    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    fn take_refusal(&self) -> bool {
        self.refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Dialer for MemoryDialer {
    fn dial(&self, url: &Url) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        if self.take_refusal() {
            return Box::pin(future::ready(Err::<(FrameSink, FrameStream), _>(TransportError::Io(
                "connection refused".into(),
            ))));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<Outgoing>();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let stalled = Arc::new(AtomicBool::new(false));

        let server = ServerEnd {
            url: url.clone(),
            from_client,
            to_client,
            stalled: Arc::clone(&stalled),
        };
        if self.sessions.send(server).is_err() {
            return Box::pin(future::ready(Err::<(FrameSink, FrameStream), _>(TransportError::Io(
                "no server accepting connections".into(),
            ))));
        }

        let sink: FrameSink = Box::pin(ClientSink {
            tx: client_tx,
            stalled,
        });
        let stream: FrameStream = Box::pin(UnboundedReceiverStream::new(client_rx));

        Box::pin(future::ready(Ok::<_, TransportError>((sink, stream))))
    }
}

/// Client write half: every frame goes straight into the server's queue.
struct ClientSink {
    tx: mpsc::UnboundedSender<Outgoing>,
    stalled: Arc<AtomicBool>,
}

impl Sink<Outgoing> for ClientSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // A stalled sink stays pending for good, like a peer that stopped
        // reading with a full socket buffer.
        if self.stalled.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: Outgoing) -> Result<(), Self::Error> {
        self.tx.send(frame).map_err(|_| TransportError::Closed {
            code: None,
            reason: "peer went away".into(),
        })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

impl ServerEnd {
    /// The URL the client dialed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Next frame written by the client, or `None` once its sink is gone.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.from_client.recv().await
    }

    /// Next text frame from the client, parsed as JSON.
    ///
    /// Returns `None` on a close frame, a non-JSON frame, or a dropped client.
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.recv().await? {
            Outgoing::Text(text) => serde_json::from_str(&text).ok(),
            Outgoing::Close { .. } => None,
        }
    }

    /// Make every further client write hang without completing.
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Stop accepting client frames; the client's next write fails.
    pub fn close_inbound(&mut self) {
        self.from_client.close();
    }

    /// Deliver a JSON document to the client. Returns `false` if it is gone.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Deliver a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(text.into())).is_ok()
    }

    /// Close the session with the given status code.
    pub fn close(&self, code: u16) -> bool {
        self.to_client
            .send(Err(TransportError::Closed {
                code: Some(code),
                reason: String::new(),
            }))
            .is_ok()
    }

    /// Break the session with a read failure.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.to_client
            .send(Err(TransportError::Io(reason.into())))
            .is_ok()
    }

    /// Play the server side of the auth handshake and accept the token.
    ///
    /// Returns the token the client presented.
    pub async fn accept_auth(&mut self, ha_version: &str) -> Option<String> {
        let token = self.expect_auth().await?;
        self.send_json(&serde_json::json!({ "type": "auth_ok", "ha_version": ha_version }));
        Some(token)
    }

    /// Play the server side of the auth handshake and reject the token.
    pub async fn reject_auth(&mut self, message: &str) -> Option<String> {
        let token = self.expect_auth().await?;
        self.send_json(&serde_json::json!({ "type": "auth_invalid", "message": message }));
        Some(token)
    }

    async fn expect_auth(&mut self) -> Option<String> {
        self.send_json(&serde_json::json!({ "type": "auth_required", "ha_version": "2024.1.0" }));
        let frame = self.recv_json().await?;
        if frame["type"] != "auth" {
            return None;
        }
        frame["access_token"].as_str().map(str::to_owned)
    }
}
