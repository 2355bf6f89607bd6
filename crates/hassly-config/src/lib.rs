//! Shared configuration for hassly.
//!
//! TOML profiles, access-token resolution (env + keyring + plaintext),
//! and translation to `hassly_api::ConnectionConfig`. The CLI adds
//! `GlobalOpts`-aware overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hassly_api::{AuthFailurePolicy, ConnectionConfig, ReconnectConfig};

/// Environment variable consulted for the access token when a profile
/// names no variable of its own.
pub const TOKEN_ENV: &str = "HASSLY_TOKEN";

const KEYRING_SERVICE: &str = "hassly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named Home Assistant instances.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for a connection or a reply.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    10
}

/// A named Home Assistant instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host name or address (e.g., "homeassistant.local").
    pub host: String,

    /// Port; omitted means the scheme default.
    pub port: Option<u16>,

    /// Connect with `wss://`.
    #[serde(default)]
    pub secure: bool,

    /// Long-lived access token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// "retry" or "fatal".
    pub auth_failure: Option<String>,

    /// First reconnect delay in milliseconds.
    pub reconnect_initial_ms: Option<u64>,

    /// Reconnect delay ceiling in milliseconds.
    pub reconnect_max_ms: Option<u64>,

    /// Consecutive failed attempts before giving up.
    pub max_retries: Option<u32>,

    /// Override the default timeout (seconds).
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hassly", "hassly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hassly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, then `HASSLY_*` environment overrides.
///
/// Nested keys use a double underscore:
/// `HASSLY_PROFILES__HOME__HOST=10.0.0.5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HASSLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the access token from the credential chain.
///
/// Order: the profile's `token_env` variable, `HASSLY_TOKEN`, the system
/// keyring (`hassly` / `<profile>/token`), then plaintext `token`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Well-known env var
    if let Ok(val) = std::env::var(TOKEN_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Parse the `auth_failure` field; absent means retry.
pub fn parse_auth_failure(value: Option<&str>) -> Result<AuthFailurePolicy, ConfigError> {
    match value {
        None | Some("retry") => Ok(AuthFailurePolicy::Retry),
        Some("fatal") => Ok(AuthFailurePolicy::Fatal),
        Some(other) => Err(ConfigError::Validation {
            field: "auth_failure".into(),
            reason: format!("expected 'retry' or 'fatal', got '{other}'"),
        }),
    }
}

/// Build a `ConnectionConfig` from a profile, with no CLI overrides.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<ConnectionConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    connection_config(profile, token)
}

/// Build a `ConnectionConfig` from a profile and an already resolved token.
pub fn connection_config(
    profile: &Profile,
    token: SecretString,
) -> Result<ConnectionConfig, ConfigError> {
    let mut config = ConnectionConfig::new(profile.host.trim(), token);
    config.port = profile.port;
    config.secure = profile.secure;
    config.auth_failure = parse_auth_failure(profile.auth_failure.as_deref())?;
    config.reconnect = reconnect_from_profile(profile);

    if let Some(secs) = profile.timeout {
        config.auth_timeout = Duration::from_secs(secs);
    }

    validate_endpoint(&config)?;
    Ok(config)
}

fn reconnect_from_profile(profile: &Profile) -> ReconnectConfig {
    let defaults = ReconnectConfig::default();
    ReconnectConfig {
        initial_delay: profile
            .reconnect_initial_ms
            .map_or(defaults.initial_delay, Duration::from_millis),
        max_delay: profile
            .reconnect_max_ms
            .map_or(defaults.max_delay, Duration::from_millis),
        max_retries: profile.max_retries.or(defaults.max_retries),
    }
}

/// Reject a host that cannot form a WebSocket endpoint.
pub fn validate_endpoint(config: &ConnectionConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }
    config
        .endpoint()
        .map(|_| ())
        .map_err(|e| ConfigError::Validation {
            field: "host".into(),
            reason: format!("'{}' does not form a valid endpoint: {e}", config.host),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "home"

        [defaults]
        output = "json"

        [profiles.home]
        host = "homeassistant.local"
        port = 8123
        token = "plaintext-token"
        auth_failure = "fatal"
        reconnect_initial_ms = 250
        max_retries = 5

        [profiles.cabin]
        host = "cabin.example.com"
        secure = true
        token_env = "CABIN_TOKEN"
    "#;

    #[test]
    fn loads_profiles_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.default_profile.as_deref(), Some("home"));
            assert_eq!(config.defaults.output, "json");
            assert_eq!(config.defaults.timeout, 10);
            assert_eq!(config.profiles.len(), 2);

            let home = &config.profiles["home"];
            assert_eq!(home.host, "homeassistant.local");
            assert_eq!(home.port, Some(8123));
            assert!(!home.secure);

            let cabin = &config.profiles["cabin"];
            assert!(cabin.secure);
            assert_eq!(cabin.token_env.as_deref(), Some("CABIN_TOKEN"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.default_profile.as_deref(), Some("default"));
            assert_eq!(config.defaults.output, "table");
            assert!(config.profiles.is_empty());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("HASSLY_DEFAULT_PROFILE", "cabin");
            jail.set_env("HASSLY_PROFILES__HOME__HOST", "10.0.0.5");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.default_profile.as_deref(), Some("cabin"));
            assert_eq!(config.profiles["home"].host, "10.0.0.5");
            Ok(())
        });
    }

    #[test]
    fn profile_token_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("CABIN_TOKEN", "from-env");
            let profile = Profile {
                host: "cabin".into(),
                token: Some("plaintext".into()),
                token_env: Some("CABIN_TOKEN".into()),
                ..Profile::default()
            };
            let token = resolve_token(&profile, "cabin").map_err(|e| e.to_string())?;
            assert_eq!(token.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn profile_translates_to_connection_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env(TOKEN_ENV, "env-token");
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            let conn = profile_to_connection_config(&config.profiles["home"], "home")
                .map_err(|e| e.to_string())?;
            assert_eq!(conn.access_token.expose_secret(), "env-token");
            assert_eq!(conn.auth_failure, AuthFailurePolicy::Fatal);
            assert_eq!(conn.reconnect.initial_delay, Duration::from_millis(250));
            assert_eq!(conn.reconnect.max_delay, Duration::from_secs(30));
            assert_eq!(conn.reconnect.max_retries, Some(5));
            assert_eq!(
                conn.endpoint().map_err(|e| e.to_string())?.as_str(),
                "ws://homeassistant.local:8123/api/websocket"
            );
            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_auth_failure_policy() {
        let err = parse_auth_failure(Some("sometimes")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "auth_failure"));
        assert_eq!(parse_auth_failure(Some("retry")).unwrap(), AuthFailurePolicy::Retry);
    }

    #[test]
    fn rejects_empty_host() {
        let config = ConnectionConfig::new("", SecretString::from("t".to_string()));
        assert!(matches!(
            validate_endpoint(&config),
            Err(ConfigError::Validation { ref field, .. }) if field == "host"
        ));
    }
}
