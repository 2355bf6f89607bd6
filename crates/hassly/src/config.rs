//! CLI configuration: thin layer over `hassly_config`.
//!
//! Picks the active profile and applies `GlobalOpts` flag overrides
//! (--host, --port, --secure, --token) before handing off to the shared
//! translation into a `ConnectionConfig`.

use std::time::Duration;

use secrecy::SecretString;

use hassly_api::{AuthFailurePolicy, ConnectionConfig};
use hassly_config::{Config, Profile, config_path, load_config};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Retries a one-shot command tolerates before reporting the failure.
const CLI_MAX_RETRIES: u32 = 2;

/// First retry delay for one-shot commands.
const CLI_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `ConnectionConfig` for this invocation.
///
/// Flags win over profile values. A one-shot command should fail fast,
/// so a rejected token ends the run and dialing gives up after a couple
/// of quick retries unless the profile says otherwise.
pub fn build_connection_config(global: &GlobalOpts) -> Result<ConnectionConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.host.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    apply_overrides(&mut profile, global);

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => hassly_config::resolve_token(&profile, &profile_name)?,
    };

    let mut config = hassly_config::connection_config(&profile, token)?;
    config.auth_failure = AuthFailurePolicy::Fatal;
    config.reconnect.max_retries = Some(profile.max_retries.unwrap_or(CLI_MAX_RETRIES));
    if profile.reconnect_initial_ms.is_none() {
        config.reconnect.initial_delay = CLI_INITIAL_DELAY;
    }

    Ok(config)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if global.port.is_some() {
        profile.port = global.port;
    }
    if global.secure {
        profile.secure = true;
    }
}
