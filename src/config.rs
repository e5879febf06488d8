//! Application-level configuration loading: gameplay constants and timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BINGO_CAOS_CONFIG_PATH";

const DEFAULT_EVENT_LOG_CAP: usize = 20;
const DEFAULT_FINISH_GRACE_SECS: u64 = 15;
const DEFAULT_ROOM_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 5;

/// How line and bingo claims are checked before they are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimPolicy {
    /// Accept what the client reports.
    #[default]
    Trust,
    /// Recompute the claim from the claimant's card and the marked events.
    Verify,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    event_log_cap: usize,
    finish_grace: Duration,
    room_idle_timeout: Duration,
    command_timeout: Duration,
    claim_policy: ClaimPolicy,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        event_log_cap = app_config.event_log_cap,
                        claim_policy = ?app_config.claim_policy,
                        "loaded room settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Maximum number of entries kept in a room's live event log.
    pub fn event_log_cap(&self) -> usize {
        self.event_log_cap
    }

    /// Delay between a bingo win and the room's deletion.
    pub fn finish_grace(&self) -> Duration {
        self.finish_grace
    }

    /// How long a room worker waits for a command before exiting.
    pub fn room_idle_timeout(&self) -> Duration {
        self.room_idle_timeout
    }

    /// How long a caller waits for a room worker's reply.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn claim_policy(&self) -> ClaimPolicy {
        self.claim_policy
    }

    /// Same settings with a different finish grace period.
    pub fn with_finish_grace(mut self, finish_grace: Duration) -> Self {
        self.finish_grace = finish_grace;
        self
    }

    /// Same settings with a different claim policy.
    pub fn with_claim_policy(mut self, claim_policy: ClaimPolicy) -> Self {
        self.claim_policy = claim_policy;
        self
    }

    /// Same settings with a different room worker idle timeout.
    pub fn with_room_idle_timeout(mut self, room_idle_timeout: Duration) -> Self {
        self.room_idle_timeout = room_idle_timeout;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_log_cap: DEFAULT_EVENT_LOG_CAP,
            finish_grace: Duration::from_secs(DEFAULT_FINISH_GRACE_SECS),
            room_idle_timeout: Duration::from_secs(DEFAULT_ROOM_IDLE_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            claim_policy: ClaimPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
/// Every field is optional; missing ones keep their default.
struct RawConfig {
    event_log_cap: Option<usize>,
    finish_grace_secs: Option<u64>,
    room_idle_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    claim_policy: Option<ClaimPolicy>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            event_log_cap: value
                .event_log_cap
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.event_log_cap),
            finish_grace: value
                .finish_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.finish_grace),
            room_idle_timeout: value
                .room_idle_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.room_idle_timeout),
            command_timeout: value
                .command_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            claim_policy: value.claim_policy.unwrap_or(defaults.claim_policy),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_keep_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"claim_policy": "verify"}"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.claim_policy(), ClaimPolicy::Verify);
        assert_eq!(config.event_log_cap(), 20);
        assert_eq!(config.finish_grace(), Duration::from_secs(15));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_cap_and_timeouts_are_ignored() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"event_log_cap": 0, "room_idle_timeout_secs": 0, "finish_grace_secs": 0}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.event_log_cap(), 20);
        assert_eq!(config.room_idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.finish_grace(), Duration::ZERO);
    }
}
