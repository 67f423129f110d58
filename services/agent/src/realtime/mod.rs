//! Speech-to-speech bridge between a transport peer and the OpenAI Realtime API.

pub mod openai;
pub mod protocol;

pub use openai::{BridgeAction, RealtimeBridge, RealtimeEndpoint, run};
