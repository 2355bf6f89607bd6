//! Service catalogue listing.

use std::collections::BTreeMap;

use serde::Serialize;
use tabled::Tabled;

use hassly_api::Connection;
use hassly_api::command::GetServices;

use crate::cli::{GlobalOpts, ServicesArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// `get_services` result: domain -> service -> description object.
type Catalogue = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Debug, Serialize)]
struct ServiceEntry {
    domain: String,
    service: String,
    name: String,
    description: String,
    fields: usize,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Fields")]
    fields: usize,
}

impl From<&ServiceEntry> for ServiceRow {
    fn from(e: &ServiceEntry) -> Self {
        Self {
            service: format!("{}.{}", e.domain, e.service),
            name: e.name.clone(),
            fields: e.fields,
        }
    }
}

fn flatten(catalogue: Catalogue, domain: Option<&str>) -> Vec<ServiceEntry> {
    catalogue
        .into_iter()
        .filter(|(name, _)| domain.is_none_or(|wanted| wanted == name.as_str()))
        .flat_map(|(domain, services)| {
            services.into_iter().map(move |(service, spec)| {
                let text = |key: &str| {
                    spec.get(key)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                };
                ServiceEntry {
                    domain: domain.clone(),
                    name: text("name"),
                    description: text("description"),
                    fields: spec
                        .get("fields")
                        .and_then(serde_json::Value::as_object)
                        .map_or(0, serde_json::Map::len),
                    service,
                }
            })
        })
        .collect()
}

pub async fn handle(
    conn: &Connection,
    args: ServicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalogue: Catalogue = util::fetch(conn, GetServices::default(), global).await?;
    let entries = flatten(catalogue, args.domain.as_deref());

    let out = output::render_list(&global.output, &entries, |e| ServiceRow::from(e), |e| {
        format!("{}.{}", e.domain, e.service)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
