// hassly-api: Async client engine for the Home Assistant WebSocket API

pub mod command;
pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
pub mod handler;
pub mod reconnect;
mod registry;
pub mod transport;

pub use command::Command;
pub use config::{AuthFailurePolicy, ConnectionConfig};
pub use connection::{CloseOutcome, Connection, ConnectionState};
pub use error::Error;
pub use event::{Context, Event, EventData, State};
pub use frame::{ErrorPayload, Reply};
pub use handler::{
    CloseHandler, EventHandler, FiredEvent, Handler, PongHandler, ResultHandler, Subscription,
};
pub use reconnect::ReconnectConfig;
pub use transport::{Dialer, Outgoing, TransportError};
