//! Shared helpers for command handlers.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use hassly_api::{Command, Connection, Reply};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Send `cmd` and wait for its reply, bounded by `--timeout`.
pub async fn request<C: Command>(
    conn: &Connection,
    cmd: C,
    global: &GlobalOpts,
) -> Result<Reply, CliError> {
    tokio::time::timeout(Duration::from_secs(global.timeout), conn.request(cmd))
        .await
        .map_err(|_| CliError::Timeout {
            seconds: global.timeout,
        })?
        .map_err(CliError::from)
}

/// Send `cmd` and decode the successful result payload as `T`.
pub async fn fetch<T, C>(conn: &Connection, cmd: C, global: &GlobalOpts) -> Result<T, CliError>
where
    T: DeserializeOwned,
    C: Command,
{
    let reply = request(conn, cmd, global).await?;
    Ok(reply.parse()?)
}

/// Value of a string attribute, or empty.
pub fn attr_str(attributes: &HashMap<String, serde_json::Value>, key: &str) -> String {
    attributes
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
