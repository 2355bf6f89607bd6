//! Command dispatch: bridges CLI args -> WebSocket requests -> output formatting.

pub mod call;
pub mod media;
pub mod panels;
pub mod services;
pub mod states;
pub mod system;
pub mod util;
pub mod watch;

use hassly_api::Connection;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, conn: &Connection, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Ping => system::ping(conn, global).await,
        Command::Info => system::info(conn, global).await,
        Command::States(args) => states::handle(conn, args, global).await,
        Command::Services(args) => services::handle(conn, args, global).await,
        Command::Panels => panels::handle(conn, global).await,
        Command::Call(args) => call::handle(conn, args, global).await,
        Command::Thumbnail(args) => media::handle(conn, args, global).await,
        Command::Watch(args) => watch::handle(conn, args, global).await,
        // Completions is handled before a connection is opened
        Command::Completions(_) => unreachable!(),
    }
}
