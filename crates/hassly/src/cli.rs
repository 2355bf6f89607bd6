//! Clap derive structures for the `hassly` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hassly -- talk to Home Assistant over its WebSocket API
#[derive(Debug, Parser)]
#[command(
    name = "hassly",
    version,
    about = "Query and control Home Assistant from the command line",
    long_about = "A command-line client for the Home Assistant WebSocket API.\n\n\
        Authenticates with a long-lived access token, then lists entity states,\n\
        calls services, and streams events over one persistent connection.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Instance profile to use
    #[arg(long, short = 'p', env = "HASSLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Home Assistant host (overrides profile)
    #[arg(long, short = 'H', env = "HASSLY_HOST", global = true)]
    pub host: Option<String>,

    /// Port (overrides profile)
    #[arg(long, env = "HASSLY_PORT", global = true)]
    pub port: Option<u16>,

    /// Connect with wss:// instead of ws://
    #[arg(long, env = "HASSLY_SECURE", global = true)]
    pub secure: bool,

    /// Long-lived access token
    #[arg(long, env = "HASSLY_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HASSLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the connection and for each reply
    #[arg(long, env = "HASSLY_TIMEOUT", default_value = "10", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the server answers
    Ping,

    /// Show core configuration (location, version, units)
    Info,

    /// List entity states
    #[command(alias = "st")]
    States(StatesArgs),

    /// List available services
    #[command(alias = "svc")]
    Services(ServicesArgs),

    /// List frontend panels
    Panels,

    /// Call a service
    Call(CallArgs),

    /// Fetch the artwork of a media player
    Thumbnail(ThumbnailArgs),

    /// Stream events as they are fired
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Only entities of this domain (e.g. light, sensor)
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServicesArgs {
    /// Only services of this domain
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service domain (e.g. light)
    pub domain: String,

    /// Service name (e.g. turn_on)
    pub service: String,

    /// Service data as a JSON object
    #[arg(long, value_parser = parse_json_object)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Args)]
pub struct ThumbnailArgs {
    /// Media player entity (e.g. media_player.living_room)
    pub entity_id: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only events of this type (e.g. state_changed)
    #[arg(long, short = 'e')]
    pub event_type: Option<String>,

    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_json_object(raw: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("service data must be a JSON object".into())
    }
}
