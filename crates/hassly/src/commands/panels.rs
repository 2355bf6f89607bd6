//! Frontend panel listing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use hassly_api::Connection;
use hassly_api::command::GetPanels;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize, Deserialize)]
struct Panel {
    #[serde(default)]
    component_name: String,
    #[serde(default)]
    url_path: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    require_admin: bool,
}

#[derive(Tabled)]
struct PanelRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Admin")]
    admin: String,
}

impl From<&Panel> for PanelRow {
    fn from(p: &Panel) -> Self {
        Self {
            path: p.url_path.clone(),
            component: p.component_name.clone(),
            title: p.title.clone().unwrap_or_default(),
            admin: if p.require_admin { "yes" } else { "" }.into(),
        }
    }
}

pub async fn handle(conn: &Connection, global: &GlobalOpts) -> Result<(), CliError> {
    let panels: BTreeMap<String, Panel> = util::fetch(conn, GetPanels::default(), global).await?;
    let panels: Vec<Panel> = panels
        .into_iter()
        .map(|(key, mut panel)| {
            if panel.url_path.is_empty() {
                panel.url_path = key;
            }
            panel
        })
        .collect();

    let out = output::render_list(&global.output, &panels, |p| PanelRow::from(p), |p| {
        p.url_path.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
