//! Mode-driven session composition and function dispatch for the voice agent.
//!
//! A process picks one [`Mode`] at startup. The [`PromptRegistry`] and the
//! [`FunctionCatalog`] turn it into instructions and a typed function set, the
//! [`SessionComposer`] binds both into a [`Session`], and the session routes
//! every model-issued function call through the [`FunctionExecutor`] while the
//! metrics collector keeps the transcript.

pub mod backend;
pub mod catalog;
pub mod composer;
pub mod executor;
pub mod llm_client;
pub mod metrics;
pub mod mode;
pub mod profile;
pub mod prompts;
pub mod record;
pub mod sequencer;
pub mod session;

pub use backend::{BackendCallError, BackendClient, BackendRequest, HttpBackend};
pub use catalog::{CatalogError, FunctionCatalog, FunctionSet, FunctionSpec};
pub use composer::{ComposeError, SessionComposer};
pub use executor::{ExecutionError, FunctionCallRequest, FunctionCallResult, FunctionExecutor};
pub use metrics::{EventSink, HttpMetricsSink, LogSink, MetricsFlushError};
pub use mode::{Mode, UnknownModeError};
pub use profile::{AgentProfile, ProfileSource};
pub use prompts::{PromptRegistry, RegistryError};
pub use record::{SessionRecord, Speaker, Usage};
pub use sequencer::CallSequencer;
pub use session::{ModelBackend, Session, SessionError, SessionState};
