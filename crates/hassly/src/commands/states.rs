//! Entity state listing.

use tabled::Tabled;

use hassly_api::command::GetStates;
use hassly_api::{Connection, State};

use crate::cli::{GlobalOpts, StatesArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Last Changed")]
    last_changed: String,
}

impl From<&State> for StateRow {
    fn from(s: &State) -> Self {
        Self {
            entity: s.entity_id.clone(),
            state: s.state.clone(),
            name: util::attr_str(&s.attributes, "friendly_name"),
            last_changed: s.last_changed.clone(),
        }
    }
}

/// Keep the states of one domain (the part before the first dot) and
/// order them by entity id.
fn select(mut states: Vec<State>, domain: Option<&str>) -> Vec<State> {
    if let Some(domain) = domain {
        states.retain(|s| {
            s.entity_id
                .split_once('.')
                .is_some_and(|(prefix, _)| prefix == domain)
        });
    }
    states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    states
}

pub async fn handle(
    conn: &Connection,
    args: StatesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let states: Vec<State> = util::fetch(conn, GetStates::default(), global).await?;
    let states = select(states, args.domain.as_deref());

    let out = output::render_list(&global.output, &states, |s| StateRow::from(s), |s| {
        s.entity_id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entity_id: &str) -> State {
        State {
            entity_id: entity_id.into(),
            state: "on".into(),
            ..State::default()
        }
    }

    #[test]
    fn filters_by_domain_and_sorts() {
        let states = vec![
            state("light.porch"),
            state("sensor.lightning_count"),
            state("light.kitchen"),
        ];
        let picked: Vec<String> = select(states, Some("light"))
            .into_iter()
            .map(|s| s.entity_id)
            .collect();
        assert_eq!(picked, vec!["light.kitchen", "light.porch"]);
    }
}
