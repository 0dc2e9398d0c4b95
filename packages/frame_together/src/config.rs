use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::error::ConfigError;

/// Relay used by the "use default" option.
pub const DEFAULT_SERVER_URL: &str = "wss://frametogether.19702038.xyz";

/// Path segment appended to the configured server URL.
pub const SYNC_PATH: &str = "sync";

// =============================================================================
// Tunables (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [session]
//                    reconnect_delay_ms = 5000
//
//   env var:         FRAME_SESSION__RECONNECT_DELAY_MS=5000

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Session timing knobs (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_join_delay_ms")]
    pub join_delay_ms: u64,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            join_delay_ms: default_join_delay_ms(),
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}
fn default_reconnect_delay_ms() -> u64 {
    3_000
}
fn default_join_delay_ms() -> u64 {
    100
}

/// Session timings (runtime view).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTimings {
    /// Period of the keep-alive sent while the link is open
    pub heartbeat_interval: Duration,
    /// Backoff before re-connecting a link that closed while in a room
    pub reconnect_delay: Duration,
    /// Settle time between a link opening (or a room being created) and the `Join`
    pub join_delay: Duration,
}

impl SessionTimings {
    pub fn from_file(fc: &SessionFileConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(fc.heartbeat_interval_ms),
            reconnect_delay: Duration::from_millis(fc.reconnect_delay_ms),
            join_delay: Duration::from_millis(fc.join_delay_ms),
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::from_file(&SessionFileConfig::default())
    }
}

/// Build a figment that layers: defaults → config.toml → FRAME_* env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("FRAME_").split("__"))
}

// =============================================================================
// Directory layout (derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct FrameConfig {
    pub data_dir: PathBuf,
}

impl FrameConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(".frametogether"),
        };

        std::fs::create_dir_all(&data_dir).map_err(|e| ConfigError::DataDir {
            path: data_dir.clone(),
            reason: e.to_string(),
        })?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    /// Where the persisted `serverUrl` lives.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.toml")
    }
}

// =============================================================================
// Server URLs
// =============================================================================

/// Validate a user-entered server URL the way the options page does.
/// Returns the trimmed URL.
pub fn validate_server_url(input: &str) -> Result<String, ConfigError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(ConfigError::InvalidServerUrl {
            url: url.to_string(),
            reason: "please enter a server URL".to_string(),
        });
    }
    if !url.starts_with("ws://") && !url.starts_with("wss://") {
        return Err(ConfigError::InvalidServerUrl {
            url: url.to_string(),
            reason: "URL must start with ws:// or wss://".to_string(),
        });
    }
    Ok(url.to_string())
}

/// The relay endpoint for `server_url`: `<server_url>/sync`.
pub fn sync_endpoint(server_url: &str) -> Result<String, ConfigError> {
    let mut endpoint = server_url.to_string();
    if !endpoint.ends_with('/') {
        endpoint.push('/');
    }
    endpoint.push_str(SYNC_PATH);

    let parsed = Url::parse(&endpoint).map_err(|e| ConfigError::InvalidServerUrl {
        url: server_url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(endpoint),
        other => Err(ConfigError::InvalidServerUrl {
            url: server_url.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}
