//! `ping` and `info` handlers.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use hassly_api::Connection;
use hassly_api::command::{GetConfig, Ping};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

// ── ping ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PingReport {
    id: u64,
    latency_ms: u128,
    server_version: Option<String>,
}

pub async fn ping(conn: &Connection, global: &GlobalOpts) -> Result<(), CliError> {
    let started = Instant::now();
    let pong = util::request(conn, Ping::default(), global).await?;
    let report = PingReport {
        id: pong.id,
        latency_ms: started.elapsed().as_millis(),
        server_version: conn.server_version().await,
    };

    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            let version = r.server_version.as_deref().unwrap_or("unknown");
            format!("pong from Home Assistant {version} in {} ms", r.latency_ms)
        },
        |r| r.latency_ms.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── info ────────────────────────────────────────────────────────────

/// Subset of `get_config` shown in the detail view; everything else is
/// kept in `extra` for structured output.
#[derive(Debug, Serialize, Deserialize)]
struct CoreConfig {
    #[serde(default)]
    location_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    time_zone: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    unit_system: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn detail(core: &CoreConfig) -> String {
    let location = match (core.latitude, core.longitude) {
        (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
        _ => "-".into(),
    };
    let units = ["temperature", "length", "mass", "volume"]
        .iter()
        .filter_map(|key| core.unit_system.get(*key).and_then(serde_json::Value::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    output::detail_block(&[
        ("Name", core.location_name.clone()),
        ("Version", core.version.clone()),
        ("State", core.state.clone().unwrap_or_else(|| "-".into())),
        ("Time zone", core.time_zone.clone()),
        ("Location", location),
        (
            "Elevation",
            core.elevation.map_or_else(|| "-".into(), |e| format!("{e} m")),
        ),
        ("Units", units),
        ("Components", core.components.len().to_string()),
    ])
}

pub async fn info(conn: &Connection, global: &GlobalOpts) -> Result<(), CliError> {
    let core: CoreConfig = util::fetch(conn, GetConfig::default(), global).await?;
    let out = output::render_single(&global.output, &core, detail, |c| c.version.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn detail_view_summarizes_core_config() {
        let core: CoreConfig = serde_json::from_value(serde_json::json!({
            "location_name": "Home",
            "version": "2024.6.1",
            "time_zone": "Europe/Amsterdam",
            "latitude": 52.3731,
            "longitude": 4.8922,
            "elevation": 0,
            "unit_system": { "temperature": "°C", "length": "km", "mass": "g", "volume": "L" },
            "components": ["sun", "light", "http"],
            "state": "RUNNING",
            "currency": "EUR"
        }))
        .unwrap();

        let out = detail(&core);
        assert!(out.contains("2024.6.1"));
        assert!(out.contains("52.3731, 4.8922"));
        assert!(out.contains("°C km g L"));
        assert!(out.contains("RUNNING"));
        assert_eq!(core.extra.get("currency").unwrap(), "EUR");
    }
}
