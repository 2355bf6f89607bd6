//! Live event stream.
//!
//! Subscribes once, prints every event as it arrives, and unsubscribes
//! on Ctrl-C or after `--count` events.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;

use hassly_api::{Connection, Event, FiredEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One event as emitted in structured output modes.
#[derive(Debug, Serialize)]
struct WatchLine<'a> {
    subscription: u64,
    fired_at: DateTime<Utc>,
    event: &'a Event,
}

fn state_of(state: Option<&hassly_api::State>) -> &str {
    state.map_or("-", |s| s.state.as_str())
}

/// Human-readable single line for table/plain modes.
fn format_line(fired: &FiredEvent, color: bool) -> String {
    let time = fired
        .fired_at
        .with_timezone(&Local)
        .format("%H:%M:%S%.3f")
        .to_string();
    let event = &fired.event;
    let data = &event.data;

    let detail = if data.entity_id.is_empty() {
        String::new()
    } else if data.old_state.is_some() || data.new_state.is_some() {
        format!(
            " {} {} -> {}",
            data.entity_id,
            state_of(data.old_state.as_ref()),
            state_of(data.new_state.as_ref())
        )
    } else {
        format!(" {}", data.entity_id)
    };

    if color {
        format!(
            "{} {}{}",
            time.dimmed(),
            event.event_type.cyan().bold(),
            detail.green()
        )
    } else {
        format!("{time} {}{detail}", event.event_type)
    }
}

pub async fn handle(conn: &Connection, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let limit = Duration::from_secs(global.timeout);
    let mut subscription = tokio::time::timeout(limit, conn.subscribe(args.event_type.clone()))
        .await
        .map_err(|_| CliError::Timeout {
            seconds: global.timeout,
        })??;
    let id = subscription.id();
    tracing::info!(subscription = id, event_type = ?args.event_type, "watching events");

    let color = output::should_color(&global.color);
    let mut seen = 0usize;
    let mut ended = false;

    loop {
        if args.count.is_some_and(|count| seen >= count) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = subscription.next() => {
                let Some(fired) = next else {
                    ended = true;
                    break;
                };
                seen += 1;
                print_event(&fired, global, color)?;
            }
        }
    }

    if ended {
        return Err(CliError::Disconnected);
    }

    // The connection is closed right after this, so failures only get logged.
    match tokio::time::timeout(limit, conn.unsubscribe(id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(subscription = id, error = %e, "unsubscribe failed"),
        Err(_) => tracing::debug!(subscription = id, "unsubscribe timed out"),
    }
    Ok(())
}

fn print_event(fired: &FiredEvent, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => format_line(fired, color),
        OutputFormat::Yaml => {
            // Documents separated so the stream stays parseable.
            format!("---\n{}", serde_yaml::to_string(&line(fired))?)
        }
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(&line(fired))?,
    };
    output::print_output(out.trim_end(), global.quiet);
    Ok(())
}

fn line(fired: &FiredEvent) -> WatchLine<'_> {
    WatchLine {
        subscription: fired.subscription,
        fired_at: fired.fired_at,
        event: &fired.event,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hassly_api::{EventData, State};

    use super::*;

    fn fired(data: EventData) -> FiredEvent {
        FiredEvent {
            subscription: 3,
            origin: "LOCAL".into(),
            fired_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).single().unwrap_or_default(),
            event: Event {
                event_type: "state_changed".into(),
                data,
                origin: "LOCAL".into(),
                time_fired: "2024-03-01T10:15:30+00:00".into(),
                ..Event::default()
            },
        }
    }

    #[test]
    fn state_change_shows_transition() {
        let data = EventData {
            entity_id: "light.kitchen".into(),
            old_state: Some(State {
                state: "off".into(),
                ..State::default()
            }),
            new_state: Some(State {
                state: "on".into(),
                ..State::default()
            }),
        };
        let text = format_line(&fired(data), false);
        assert!(text.ends_with(" state_changed light.kitchen off -> on"));
    }

    #[test]
    fn removed_entity_has_no_new_state() {
        let data = EventData {
            entity_id: "sensor.gone".into(),
            old_state: Some(State {
                state: "12".into(),
                ..State::default()
            }),
            new_state: None,
        };
        let text = format_line(&fired(data), false);
        assert!(text.ends_with("sensor.gone 12 -> -"));
    }

    #[test]
    fn event_without_entity_shows_type_only() {
        let text = format_line(&fired(EventData::default()), false);
        assert!(text.ends_with(" state_changed"));
    }
}
