//! Prompt Registry
//!
//! Maps every [`Mode`] to its system instructions. The built-in prompts are
//! compiled into the binary; a directory of `<mode>.md` files can replace any
//! of them at startup. The registry is immutable once built.

use crate::mode::{Mode, UnknownModeError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Failures while assembling the registry at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No prompt registered for mode '{0}'")]
    MissingPrompt(Mode),
    #[error("Prompt for mode '{0}' is empty")]
    EmptyPrompt(Mode),
    #[error("Failed to read prompt file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn builtin_prompt(mode: Mode) -> &'static str {
    match mode {
        Mode::Orders => include_str!("../prompts/orders.md"),
        Mode::Appointments => include_str!("../prompts/appointments.md"),
        Mode::Leads => include_str!("../prompts/leads.md"),
        Mode::Airline => include_str!("../prompts/airline.md"),
        Mode::Jarvis => include_str!("../prompts/jarvis.md"),
    }
}

/// Read-only lookup from mode to instruction text.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    prompts: HashMap<Mode, String>,
}

impl PromptRegistry {
    /// Builds the registry from the compiled-in prompts only.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_entries(
            Mode::ALL
                .into_iter()
                .map(|mode| (mode, builtin_prompt(mode).to_string())),
        )
    }

    /// Builds the registry, letting `<dir>/<mode>.md` replace the built-in
    /// prompt for that mode. Modes without an override file keep the default.
    pub fn load(overrides: Option<&Path>) -> Result<Self, RegistryError> {
        let mut prompts: HashMap<Mode, String> = Mode::ALL
            .into_iter()
            .map(|mode| (mode, builtin_prompt(mode).to_string()))
            .collect();

        if let Some(dir) = overrides {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "Prompt override directory does not exist");
            }
            for mode in Mode::ALL {
                let path = dir.join(format!("{}.md", mode));
                if !path.is_file() {
                    continue;
                }
                let content = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
                    path: path.clone(),
                    source,
                })?;
                info!(%mode, path = %path.display(), "Prompt override loaded");
                prompts.insert(mode, content);
            }
        }

        Self::from_entries(prompts)
    }

    /// Validates that every mode has a non-empty prompt.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Mode, String)>,
    ) -> Result<Self, RegistryError> {
        let prompts: HashMap<Mode, String> = entries.into_iter().collect();
        for mode in Mode::ALL {
            match prompts.get(&mode) {
                None => return Err(RegistryError::MissingPrompt(mode)),
                Some(text) if text.trim().is_empty() => {
                    return Err(RegistryError::EmptyPrompt(mode));
                }
                Some(_) => {}
            }
        }
        Ok(Self { prompts })
    }

    /// Returns the instructions for `mode`.
    pub fn get_prompt(&self, mode: Mode) -> Result<&str, UnknownModeError> {
        self.prompts
            .get(&mode)
            .map(String::as_str)
            .ok_or_else(|| UnknownModeError(mode.to_string()))
    }

    /// Resolves a mode by name and returns its instructions.
    pub fn get_prompt_by_name(&self, name: &str) -> Result<&str, UnknownModeError> {
        self.get_prompt(name.parse()?)
    }
}
