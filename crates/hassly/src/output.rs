//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serializable items in the chosen format.
///
/// - `table`: converts each item with `to_row` and builds a rounded table
/// - `json` / `json-compact` / `yaml`: serializes the original data
/// - `plain`: calls `id_fn` on each item, one line per item
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render a single item. Table output uses the pre-formatted `detail_fn`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Two-column key/value block for detail views.
pub fn detail_block(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    pairs
        .iter()
        .map(|(key, value)| format!("{key:<width$}  {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_structured<T: serde::Serialize + ?Sized>(
    format: &OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        _ => Ok(serde_json::to_string_pretty(data)?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        id: String,
        value: u32,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                id: "light.kitchen".into(),
                value: 1,
            },
            Item {
                id: "sun.sun".into(),
                value: 2,
            },
        ]
    }

    fn row(item: &Item) -> ItemRow {
        ItemRow {
            id: item.id.clone(),
        }
    }

    #[test]
    fn plain_lists_one_identifier_per_line() {
        let out = render_list(&OutputFormat::Plain, &items(), row, |i| i.id.clone()).unwrap();
        assert_eq!(out, "light.kitchen\nsun.sun");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(&OutputFormat::JsonCompact, &items(), row, |i| i.id.clone()).unwrap();
        assert_eq!(
            out,
            r#"[{"id":"light.kitchen","value":1},{"id":"sun.sun","value":2}]"#
        );
    }

    #[test]
    fn table_contains_header_and_rows() {
        let out = render_list(&OutputFormat::Table, &items(), row, |i| i.id.clone()).unwrap();
        assert!(out.contains("ID"));
        assert!(out.contains("light.kitchen"));
        assert!(out.contains("sun.sun"));
    }

    #[test]
    fn yaml_renders_fields() {
        let item = Item {
            id: "sun.sun".into(),
            value: 2,
        };
        let out = render_single(&OutputFormat::Yaml, &item, |_| String::new(), |i| i.id.clone())
            .unwrap();
        assert!(out.contains("id: sun.sun"));
        assert!(out.contains("value: 2"));
    }

    #[test]
    fn detail_block_aligns_keys() {
        let out = detail_block(&[("Name", "Home".into()), ("Version", "2024.6.1".into())]);
        assert_eq!(out, "Name     Home\nVersion  2024.6.1");
    }
}
