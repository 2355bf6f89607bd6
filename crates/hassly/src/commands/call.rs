//! `call` handler.

use hassly_api::Connection;
use hassly_api::command::CallService;

use crate::cli::{CallArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(conn: &Connection, args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let target = format!("{}.{}", args.domain, args.service);
    let cmd = CallService::new(args.domain, args.service, args.data);
    let result: serde_json::Value = util::fetch(conn, cmd, global).await?;

    match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            if !global.quiet {
                eprintln!("Called {target}");
            }
        }
        _ => {
            let out = output::render_single(&global.output, &result, |_| String::new(), |_| {
                String::new()
            })?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}
