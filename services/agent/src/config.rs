use crate::realtime::openai::DEFAULT_REALTIME_URL;
use nova_core::Mode;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// How a remote peer reaches the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Audio over the `/ws` endpoint of the health listener.
    WebSocket,
    /// A LiveKit room; requires the `livekit` cargo feature.
    LiveKit,
}

/// LiveKit connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub room: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub openai_api_key: String,
    pub api_base_url: String,
    pub port: u16,
    pub transport: Transport,
    pub livekit: Option<LiveKitConfig>,
    pub livekit_room: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub chat_model: String,
    pub backend_timeout: Duration,
    pub drain_timeout: Duration,
    pub metrics_url: Option<String>,
    pub prompts_path: Option<PathBuf>,
    pub agent_config_path: PathBuf,
    pub agent_name: Option<String>,
    pub use_api_config: bool,
    /// `None` when `RUST_LOG` is unset, so each run mode can pick its default.
    pub log_level: Option<Level>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_secs(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match var(name) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let mode_str = var("MODE").unwrap_or_else(|| "orders".to_string());
        let mode = mode_str
            .parse::<Mode>()
            .map_err(|e| ConfigError::InvalidValue("MODE".to_string(), e.to_string()))?;

        let openai_api_key =
            var("OPENAI_API_KEY").ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let api_base_url = var("API_BASE_URL").unwrap_or_else(|| "http://localhost:3001".to_string());
        check_http_url("API_BASE_URL", &api_base_url)?;

        let port = match var("PORT") {
            None => 8080,
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), e.to_string()))?,
        };

        let transport = match var("TRANSPORT").map(|t| t.to_lowercase()).as_deref() {
            None | Some("websocket") | Some("ws") => Transport::WebSocket,
            Some("livekit") => Transport::LiveKit,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "TRANSPORT".to_string(),
                    format!("'{}' is not one of: websocket, livekit", other),
                ));
            }
        };

        let livekit_room = var("LIVEKIT_ROOM").unwrap_or_else(|| "voice-agent".to_string());
        let livekit = match (var("LIVEKIT_URL"), var("LIVEKIT_API_KEY"), var("LIVEKIT_API_SECRET")) {
            (Some(url), Some(api_key), Some(api_secret)) => Some(LiveKitConfig {
                url,
                api_key,
                api_secret,
                room: livekit_room.clone(),
            }),
            _ => None,
        };

        let realtime_url = var("REALTIME_URL").unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string());
        let realtime_model = var("REALTIME_MODEL")
            .unwrap_or_else(|| "gpt-4o-realtime-preview-2024-12-17".to_string());
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let backend_timeout = parse_secs("BACKEND_TIMEOUT_SECS", 10)?;
        let drain_timeout = parse_secs("DRAIN_TIMEOUT_SECS", 5)?;

        let metrics_url = var("METRICS_URL");
        if let Some(url) = &metrics_url {
            check_http_url("METRICS_URL", url)?;
        }

        let prompts_path = var("PROMPTS_PATH").map(PathBuf::from);
        let agent_config_path = var("AGENT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.json"));
        let agent_name = var("AGENT_NAME");
        let use_api_config = match var("USE_API_CONFIG").map(|v| v.to_lowercase()).as_deref() {
            None | Some("false") | Some("0") | Some("no") => false,
            Some("true") | Some("1") | Some("yes") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "USE_API_CONFIG".to_string(),
                    format!("'{}' is not a boolean", other),
                ));
            }
        };

        let log_level = match var("RUST_LOG") {
            None => None,
            Some(raw) => Some(raw.parse::<Level>().map_err(|_| {
                ConfigError::InvalidValue(
                    "RUST_LOG".to_string(),
                    format!("'{}' is not a valid log level", raw),
                )
            })?),
        };

        Ok(Self {
            mode,
            openai_api_key,
            api_base_url,
            port,
            transport,
            livekit,
            livekit_room,
            realtime_url,
            realtime_model,
            chat_model,
            backend_timeout,
            drain_timeout,
            metrics_url,
            prompts_path,
            agent_config_path,
            agent_name,
            use_api_config,
            log_level,
        })
    }

    /// Checks the settings a connected run mode needs beyond `from_env`.
    pub fn require_transport(&self) -> Result<(), ConfigError> {
        if self.transport == Transport::LiveKit && !cfg!(feature = "livekit") {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT".to_string(),
                "'livekit' requires building with the 'livekit' feature".to_string(),
            ));
        }
        if self.transport == Transport::LiveKit && self.livekit.is_none() {
            return Err(ConfigError::MissingVar(
                "LIVEKIT_URL, LIVEKIT_API_KEY and LIVEKIT_API_SECRET must be set for the 'livekit' transport"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Rejects values that are obviously not http(s) URLs.
fn check_http_url(name: &str, url: &str) -> Result<(), ConfigError> {
    let valid = (url.starts_with("http://") || url.starts_with("https://"))
        && url.split("://").nth(1).is_some_and(|rest| !rest.is_empty());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not an http(s) URL", url),
        ))
    }
}
