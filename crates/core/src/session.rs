//! One conversation, from connection to final flush.
//!
//! A session moves through `Created -> Active -> Closing -> Closed`. Turns and
//! function calls are only accepted while `Active`. Closing cancels in-flight
//! function calls, waits for them to record their outcome, drains the metrics
//! collector and flushes the record exactly once. All of it shares one drain
//! deadline.

use crate::catalog::FunctionSet;
use crate::executor::{FunctionCallRequest, FunctionCallResult, FunctionExecutor};
use crate::metrics::{EventRecorder, FlushOutcome, MetricsCollector, SessionEvent};
use crate::mode::Mode;
use crate::profile::AgentProfile;
use crate::record::{Speaker, Usage};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Active) | (Created, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    #[error("Session is {0}, not active")]
    NotActive(SessionState),
}

/// The model backend a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// Speech-to-speech over the realtime API.
    Realtime { model: String },
    /// Chat completions driven by text turns.
    Text { model: String },
}

impl ModelBackend {
    pub fn model(&self) -> &str {
        match self {
            ModelBackend::Realtime { model } | ModelBackend::Text { model } => model,
        }
    }
}

pub struct Session {
    id: Uuid,
    mode: Mode,
    instructions: String,
    profile: AgentProfile,
    model: ModelBackend,
    executor: Arc<FunctionExecutor>,
    recorder: EventRecorder,
    collector: Mutex<Option<MetricsCollector>>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    in_flight: TaskTracker,
}

impl Session {
    pub(crate) fn new(
        id: Uuid,
        mode: Mode,
        instructions: String,
        profile: AgentProfile,
        model: ModelBackend,
        executor: Arc<FunctionExecutor>,
        collector: MetricsCollector,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Created);
        Self {
            id,
            mode,
            instructions,
            profile,
            model,
            executor,
            recorder: collector.recorder(),
            collector: Mutex::new(Some(collector)),
            state,
            shutdown: CancellationToken::new(),
            in_flight: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Mode prompt plus the shared conversation rules.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn greeting(&self) -> &str {
        &self.profile.greeting_instructions
    }

    pub fn voice(&self) -> &str {
        &self.profile.voice
    }

    pub fn model(&self) -> &ModelBackend {
        &self.model
    }

    pub fn functions(&self) -> &Arc<FunctionSet> {
        self.executor.functions()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Cancelled when the session starts closing.
    pub fn closing_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Marks the model connection as established.
    pub fn activate(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Active)?;
        info!(session_id = %self.id, mode = %self.mode, "Session active");
        Ok(())
    }

    pub fn record_turn(&self, speaker: Speaker, content: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_active()?;
        let content = content.into();
        if content.trim().is_empty() {
            return Ok(());
        }
        self.recorder.record(SessionEvent::Turn { speaker, content });
        Ok(())
    }

    pub fn record_usage(&self, usage: Usage) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.recorder.record(SessionEvent::Usage(usage));
        Ok(())
    }

    /// Runs one function call. If the session starts closing first the call
    /// is abandoned and a `cancelled` failure is returned.
    #[instrument(skip(self, request), fields(session_id = %self.id, call_id = %request.call_id, function = %request.name))]
    pub async fn call_function(
        &self,
        request: FunctionCallRequest,
    ) -> Result<FunctionCallResult, SessionError> {
        // Held until the call is recorded, so `close` can wait for it.
        let _in_flight = self.in_flight.token();
        self.ensure_active()?;
        let started = Instant::now();

        let result = tokio::select! {
            result = self.executor.dispatch(&request) => result,
            _ = self.shutdown.cancelled() => {
                warn!("Function call abandoned by shutdown");
                FunctionCallResult::cancelled()
            }
        };

        self.recorder.record(SessionEvent::Call {
            request,
            result: result.clone(),
            latency: started.elapsed(),
        });
        Ok(result)
    }

    /// Moves to `Closing`, cancels in-flight work, flushes the record within
    /// `drain_timeout` and ends in `Closed`.
    pub async fn close(&self, drain_timeout: Duration) -> Result<FlushOutcome, SessionError> {
        let previous = self.transition(SessionState::Closing)?;
        info!(session_id = %self.id, from = %previous, "Session closing");
        self.shutdown.cancel();

        let deadline = Instant::now() + drain_timeout;
        self.in_flight.close();
        if tokio::time::timeout(drain_timeout, self.in_flight.wait())
            .await
            .is_err()
        {
            warn!(
                session_id = %self.id,
                pending = self.in_flight.len(),
                "Function calls still unrecorded at the drain deadline"
            );
        }

        let collector = self
            .collector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let outcome = match collector {
            Some(collector) => {
                collector
                    .finalize(deadline.saturating_duration_since(Instant::now()))
                    .await
            }
            None => FlushOutcome::Flushed,
        };

        self.transition(SessionState::Closed)?;
        info!(session_id = %self.id, ?outcome, "Session closed");
        Ok(outcome)
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Active => Ok(()),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Applies `to` atomically, returning the previous state.
    fn transition(&self, to: SessionState) -> Result<SessionState, SessionError> {
        let mut previous = SessionState::Created;
        let changed = self.state.send_if_modified(|current| {
            previous = *current;
            if current.can_transition_to(to) {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            Ok(previous)
        } else {
            Err(SessionError::InvalidTransition { from: previous, to })
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("model", &self.model)
            .finish()
    }
}
