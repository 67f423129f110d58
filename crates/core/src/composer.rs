//! Session Composer
//!
//! Resolves a mode into its prompt and function set and binds them, with a
//! fresh executor and metrics collector, into a [`Session`].

use crate::backend::BackendClient;
use crate::catalog::FunctionCatalog;
use crate::executor::FunctionExecutor;
use crate::metrics::{DEFAULT_EVENT_CAPACITY, EventSink, MetricsCollector};
use crate::mode::{Mode, UnknownModeError};
use crate::profile::AgentProfile;
use crate::prompts::PromptRegistry;
use crate::record::SessionRecord;
use crate::session::{ModelBackend, Session};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Appended to every mode prompt.
pub const BREVITY_RULE: &str =
    "IMPORTANT: Keep every reply short, no more than two sentences, and ask one question at a time.";

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Invalid mode: {0}")]
    InvalidMode(#[from] UnknownModeError),
}

pub fn compose_instructions(prompt: &str) -> String {
    format!("{}\n\n{}", prompt.trim_end(), BREVITY_RULE)
}

/// Holds the process-wide, read-only pieces every session is built from.
pub struct SessionComposer {
    prompts: Arc<PromptRegistry>,
    catalog: Arc<FunctionCatalog>,
    backend: Arc<dyn BackendClient>,
    sink: Arc<dyn EventSink>,
    profile: AgentProfile,
}

impl SessionComposer {
    pub fn new(
        prompts: Arc<PromptRegistry>,
        catalog: Arc<FunctionCatalog>,
        backend: Arc<dyn BackendClient>,
        sink: Arc<dyn EventSink>,
        profile: AgentProfile,
    ) -> Self {
        Self {
            prompts,
            catalog,
            backend,
            sink,
            profile,
        }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Builds a new session in the `Created` state.
    ///
    /// Must be called inside a Tokio runtime: the session's metrics collector
    /// is spawned here.
    #[instrument(skip_all, fields(%mode))]
    pub fn compose(&self, mode: Mode, model: ModelBackend) -> Result<Session, ComposeError> {
        let prompt = self.prompts.get_prompt(mode)?;
        let functions = self.catalog.get_functions(mode)?;

        let id = Uuid::new_v4();
        let executor = Arc::new(FunctionExecutor::new(functions, self.backend.clone()));
        let collector = MetricsCollector::start(
            SessionRecord::new(id, mode),
            self.sink.clone(),
            DEFAULT_EVENT_CAPACITY,
        );

        info!(
            session_id = %id,
            model = model.model(),
            functions = executor.functions().len(),
            "Session composed"
        );
        Ok(Session::new(
            id,
            mode,
            compose_instructions(prompt),
            self.profile.clone(),
            model,
            executor,
            collector,
        ))
    }

    pub fn compose_by_name(&self, name: &str, model: ModelBackend) -> Result<Session, ComposeError> {
        self.compose(name.parse()?, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackendClient;
    use crate::metrics::LogSink;
    use crate::session::SessionState;

    fn composer() -> SessionComposer {
        SessionComposer::new(
            Arc::new(PromptRegistry::builtin().unwrap()),
            Arc::new(FunctionCatalog::builtin().unwrap()),
            Arc::new(MockBackendClient::new()),
            Arc::new(LogSink),
            AgentProfile::default(),
        )
    }

    fn text() -> ModelBackend {
        ModelBackend::Text { model: "gpt-4o-mini".into() }
    }

    #[tokio::test]
    async fn test_compose_binds_prompt_and_functions() {
        let session = composer().compose(Mode::Airline, text()).unwrap();

        assert_eq!(session.mode(), Mode::Airline);
        assert_eq!(session.state(), SessionState::Created);
        assert!(session.instructions().ends_with(BREVITY_RULE));
        assert!(session.instructions().contains("checkInPassenger"));
        assert_eq!(session.functions().mode(), Mode::Airline);
        assert_eq!(session.model().model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_unknown_mode_name_is_invalid() {
        let err = composer().compose_by_name("unknown_mode", text()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidMode(_)));
    }

    #[tokio::test]
    async fn test_each_compose_yields_a_fresh_session() {
        let composer = composer();
        let a = composer.compose(Mode::Orders, text()).unwrap();
        let b = composer.compose(Mode::Orders, text()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_instructions_end_with_brevity_rule() {
        let composed = compose_instructions("You are helpful.\n\n");
        assert_eq!(composed, format!("You are helpful.\n\n{BREVITY_RULE}"));
    }
}
