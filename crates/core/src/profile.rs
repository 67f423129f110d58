//! Agent profile: greeting, voice and model overrides for a deployment.
//!
//! Resolution order is backend (when enabled), then a local JSON file, then
//! built-in defaults. Each failed source is logged and skipped.

use crate::backend::{BackendCallError, BackendClient, BackendRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_GREETING: &str = "Greet the user and offer your assistance.";
pub const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub name: String,
    pub greeting_instructions: String,
    pub voice: String,
    pub realtime_model: Option<String>,
    pub chat_model: Option<String>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            greeting_instructions: DEFAULT_GREETING.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            realtime_model: None,
            chat_model: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read profile file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid profile JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No agent profile named '{0}'")]
    NotFound(String),
    #[error("Profile file holds no agent profile")]
    Empty,
    #[error("Failed to fetch profile from backend: {0}")]
    Backend(#[from] BackendCallError),
}

/// Where to look for a profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileSource {
    pub file: Option<PathBuf>,
    pub name: Option<String>,
    pub use_backend: bool,
}

impl AgentProfile {
    /// Parses a profile file holding either one object or an array of them.
    /// With an array, `name` picks the entry; otherwise the first one wins.
    pub fn from_file(path: &Path, name: Option<&str>) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(serde_json::from_str(&content)?, name)
    }

    fn from_json(value: Value, name: Option<&str>) -> Result<Self, ProfileError> {
        match value {
            Value::Array(entries) => {
                let mut profiles = entries
                    .into_iter()
                    .map(serde_json::from_value::<AgentProfile>)
                    .collect::<Result<Vec<_>, _>>()?;
                match name {
                    Some(wanted) => profiles
                        .into_iter()
                        .find(|p| p.name == wanted)
                        .ok_or_else(|| ProfileError::NotFound(wanted.to_string())),
                    None if profiles.is_empty() => Err(ProfileError::Empty),
                    None => Ok(profiles.swap_remove(0)),
                }
            }
            other => {
                let profile: AgentProfile = serde_json::from_value(other)?;
                match name {
                    Some(wanted) if profile.name != wanted => {
                        Err(ProfileError::NotFound(wanted.to_string()))
                    }
                    _ => Ok(profile),
                }
            }
        }
    }

    /// Fetches `GET /agents/name/{name}`, or `GET /agents` when no name is set.
    pub async fn from_backend(
        backend: &dyn BackendClient,
        name: Option<&str>,
    ) -> Result<Self, ProfileError> {
        let request = match name {
            Some(name) => BackendRequest::get(["agents", "name", name]),
            None => BackendRequest::get(["agents"]),
        };
        let value = backend.send(request).await?;
        Self::from_json(value, name)
    }

    /// Walks the sources in order and never fails.
    pub async fn resolve(source: &ProfileSource, backend: &dyn BackendClient) -> Self {
        let name = source.name.as_deref();

        if source.use_backend {
            match Self::from_backend(backend, name).await {
                Ok(profile) => {
                    info!(profile = %profile.name, "Agent profile loaded from backend");
                    return profile;
                }
                Err(e) => warn!(error = %e, "Backend profile unavailable, trying file"),
            }
        }

        if let Some(path) = &source.file {
            if path.is_file() {
                match Self::from_file(path, name) {
                    Ok(profile) => {
                        info!(profile = %profile.name, path = %path.display(), "Agent profile loaded from file");
                        return profile;
                    }
                    Err(e) => warn!(error = %e, "Profile file unusable, using defaults"),
                }
            } else {
                info!(path = %path.display(), "No profile file, using defaults");
            }
        }

        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackendClient;
    use serde_json::json;
    use tempfile::NamedTempFile;
    use std::io::Write;

    fn write_profile(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_single_object_with_defaults() {
        let file = write_profile(r#"{ "name": "front-desk", "voice": "shimmer" }"#);
        let profile = AgentProfile::from_file(file.path(), None).unwrap();
        assert_eq!(profile.name, "front-desk");
        assert_eq!(profile.voice, "shimmer");
        assert_eq!(profile.greeting_instructions, DEFAULT_GREETING);
    }

    #[test]
    fn test_array_picks_named_entry_or_first() {
        let file = write_profile(
            r#"[{ "name": "a", "voice": "echo" }, { "name": "b", "voice": "sage" }]"#,
        );
        assert_eq!(AgentProfile::from_file(file.path(), Some("b")).unwrap().voice, "sage");
        assert_eq!(AgentProfile::from_file(file.path(), None).unwrap().voice, "echo");
        assert!(matches!(
            AgentProfile::from_file(file.path(), Some("c")),
            Err(ProfileError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_array_is_an_error() {
        let file = write_profile("[]");
        assert!(matches!(
            AgentProfile::from_file(file.path(), None),
            Err(ProfileError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_resolve_prefers_backend() {
        let mut backend = MockBackendClient::new();
        backend
            .expect_send()
            .withf(|r| r.path() == "/agents/name/concierge")
            .times(1)
            .returning(|_| Ok(json!({ "name": "concierge", "voice": "verse" })));

        let source = ProfileSource {
            file: None,
            name: Some("concierge".into()),
            use_backend: true,
        };
        let profile = AgentProfile::resolve(&source, &backend).await;
        assert_eq!(profile.voice, "verse");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_file_then_defaults() {
        let mut backend = MockBackendClient::new();
        backend
            .expect_send()
            .times(1)
            .returning(|_| Err(BackendCallError::Connection("refused".into())));

        let file = write_profile(r#"{ "name": "local", "greeting_instructions": "Say hola." }"#);
        let source = ProfileSource {
            file: Some(file.path().to_path_buf()),
            name: None,
            use_backend: true,
        };
        let profile = AgentProfile::resolve(&source, &backend).await;
        assert_eq!(profile.greeting_instructions, "Say hola.");

        let missing = ProfileSource {
            file: Some(PathBuf::from("/no/such/config.json")),
            ..Default::default()
        };
        let profile = AgentProfile::resolve(&missing, &MockBackendClient::new()).await;
        assert_eq!(profile, AgentProfile::default());
    }
}
