//! CLI error types with miette diagnostics.
//!
//! Maps engine and config errors into user-facing errors with actionable
//! help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hassly_api::Error as ApiError;
use hassly_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Home Assistant: {reason}")]
    #[diagnostic(
        code(hassly::connection_failed),
        help(
            "Check that Home Assistant is running and reachable.\n\
             Try: hassly ping --host <host> --port 8123 -v"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Connection to Home Assistant was lost")]
    #[diagnostic(
        code(hassly::disconnected),
        help("The server closed the session before replying. Run the command again.")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hassly::auth_failed),
        help(
            "Verify the long-lived access token passed with --token, HASSLY_TOKEN\n\
             or the profile. Create one under your Home Assistant user profile > Security."
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hassly::no_credentials),
        help(
            "Pass --token, set the HASSLY_TOKEN environment variable,\n\
             or add `token_env` / `token` to the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Remote ───────────────────────────────────────────────────────
    #[error("Home Assistant error ({code}): {message}")]
    #[diagnostic(code(hassly::remote_error))]
    Remote { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hassly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hassly::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Home Assistant instance configured")]
    #[diagnostic(
        code(hassly::no_config),
        help(
            "Pass --host and --token, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hassly::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(hassly::timeout),
        help("Increase the timeout with --timeout or check that the server is responsive.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Unexpected payload: {0}")]
    #[diagnostic(code(hassly::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(hassly::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Error mapping ────────────────────────────────────────────────────

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidUrl(e) => Self::Validation {
                field: "host".into(),
                reason: e.to_string(),
            },

            ApiError::AuthRejected { message } => Self::AuthFailed { message },

            ApiError::AuthTimeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },

            ApiError::Disconnected => Self::Disconnected,

            ApiError::NotConnected => Self::ConnectionFailed {
                reason: "connection is not open".into(),
            },

            ApiError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },

            err @ (ApiError::Transport(_) | ApiError::Handshake(_)) => Self::ConnectionFailed {
                reason: err.to_string(),
            },

            ApiError::Serialization(e) => Self::Json(e),

            ApiError::Remote { code, message } => Self::Remote { code, message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Figment(e) => Self::Config(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_maps_to_auth_exit_code() {
        let err = CliError::from(ApiError::AuthRejected {
            message: "Invalid access token or password".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn transport_failure_maps_to_connection_exit_code() {
        let err = CliError::from(ApiError::Transport(hassly_api::TransportError::Io(
            "connection refused".into(),
        )));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn remote_error_keeps_code() {
        let err = CliError::from(ApiError::Remote {
            code: "not_found".into(),
            message: "Service not found.".into(),
        });
        assert_eq!(err.exit_code(), exit_code::GENERAL);
        assert_eq!(err.to_string(), "Home Assistant error (not_found): Service not found.");
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "auth_failure".into(),
            reason: "expected 'retry' or 'fatal'".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
