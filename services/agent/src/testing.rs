//! Fakes shared by the service's unit tests.

use async_trait::async_trait;
use nova_core::{
    AgentProfile, BackendCallError, BackendClient, BackendRequest, EventSink, FunctionCatalog,
    PromptRegistry, SessionComposer,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub use nova_core::metrics::testing::CapturingSink;

/// Backend that answers every request with the same payload.
pub struct FakeBackend {
    response: Value,
    requests: Mutex<Vec<BackendRequest>>,
}

impl FakeBackend {
    pub fn returning(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendCallError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

pub fn composer(backend: Arc<dyn BackendClient>, sink: Arc<dyn EventSink>) -> SessionComposer {
    SessionComposer::new(
        Arc::new(PromptRegistry::builtin().unwrap()),
        Arc::new(FunctionCatalog::builtin().unwrap()),
        backend,
        sink,
        AgentProfile::default(),
    )
}
