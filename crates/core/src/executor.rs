//! Function Executor
//!
//! Turns a model-issued function call into at most one backend request. Every
//! failure is converted into a [`FunctionCallResult`] the model can read, so a
//! broken call never ends the conversation.

use crate::backend::{BackendCallError, BackendClient};
use crate::catalog::FunctionSet;
use crate::mode::Mode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A function call as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    /// Identifier assigned by the model; pairs the result with the request.
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl FunctionCallRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Builds a request from the raw argument string models send. Text that is
    /// not JSON is kept as a string and fails argument validation later.
    pub fn from_raw(call_id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        let arguments = if raw.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        Self::new(call_id, name, arguments)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Function '{name}' is not available in mode '{mode}'")]
    UnknownFunction { mode: Mode, name: String },
    #[error("Invalid arguments for '{function}': {reason}")]
    InvalidArguments { function: String, reason: String },
    #[error("Backend call for '{function}' failed: {source}")]
    Backend {
        function: String,
        mutating: bool,
        #[source]
        source: BackendCallError,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::UnknownFunction { .. } => "unknown_function",
            ExecutionError::InvalidArguments { .. } => "invalid_arguments",
            ExecutionError::Backend { .. } => "backend_error",
        }
    }
}

/// The return value of a function call as seen by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FunctionCallResult {
    Success {
        payload: Value,
    },
    Failure {
        kind: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
        retryable: bool,
        #[serde(default)]
        outcome_unknown: bool,
    },
}

impl FunctionCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FunctionCallResult::Success { .. })
    }

    /// Result for a call abandoned because the session is shutting down.
    pub fn cancelled() -> Self {
        FunctionCallResult::Failure {
            kind: "cancelled".to_string(),
            reason: "The session ended before the call completed".to_string(),
            cause: None,
            retryable: false,
            outcome_unknown: true,
        }
    }

    /// The JSON text handed back to the model as the function output.
    pub fn to_model_output(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({ "status": "failure", "reason": "unserializable result" }).to_string()
        })
    }
}

impl From<Result<Value, ExecutionError>> for FunctionCallResult {
    fn from(result: Result<Value, ExecutionError>) -> Self {
        match result {
            Ok(payload) => FunctionCallResult::Success { payload },
            Err(err) => {
                let (cause, retryable, outcome_unknown) = match &err {
                    ExecutionError::Backend {
                        mutating, source, ..
                    } => (
                        Some(source.cause().to_string()),
                        source.is_retryable(*mutating),
                        source.outcome_unknown(*mutating),
                    ),
                    _ => (None, false, false),
                };
                FunctionCallResult::Failure {
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                    cause,
                    retryable,
                    outcome_unknown,
                }
            }
        }
    }
}

/// Dispatches calls against one mode's function set.
pub struct FunctionExecutor {
    functions: Arc<FunctionSet>,
    backend: Arc<dyn BackendClient>,
}

impl FunctionExecutor {
    pub fn new(functions: Arc<FunctionSet>, backend: Arc<dyn BackendClient>) -> Self {
        Self { functions, backend }
    }

    pub fn functions(&self) -> &Arc<FunctionSet> {
        &self.functions
    }

    /// Validates the call and performs exactly one backend request.
    ///
    /// Unknown names and invalid arguments return before anything is sent.
    /// Mutating calls carry the call id as their idempotency key.
    pub async fn execute(&self, request: &FunctionCallRequest) -> Result<Value, ExecutionError> {
        let handler =
            self.functions
                .get(&request.name)
                .ok_or_else(|| ExecutionError::UnknownFunction {
                    mode: self.functions.mode(),
                    name: request.name.clone(),
                })?;

        let mut backend_request = handler.prepare(request.arguments.clone()).map_err(|reason| {
            ExecutionError::InvalidArguments {
                function: request.name.clone(),
                reason,
            }
        })?;

        let mutating = handler.spec().mutating;
        if mutating {
            backend_request = backend_request.with_idempotency_key(request.call_id.clone());
        }

        debug!(
            call_id = %request.call_id,
            function = %request.name,
            path = %backend_request.path(),
            "Dispatching function call"
        );

        self.backend
            .send(backend_request)
            .await
            .map_err(|source| ExecutionError::Backend {
                function: request.name.clone(),
                mutating,
                source,
            })
    }

    /// Like [`execute`](Self::execute) but always yields a model-readable result.
    pub async fn dispatch(&self, request: &FunctionCallRequest) -> FunctionCallResult {
        let outcome = self.execute(request).await;
        match &outcome {
            Ok(_) => info!(call_id = %request.call_id, function = %request.name, "Function call succeeded"),
            Err(e) => warn!(call_id = %request.call_id, function = %request.name, error = %e, "Function call failed"),
        }
        outcome.into()
    }
}
