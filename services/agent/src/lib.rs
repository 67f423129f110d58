//! Nova Agent Service Library Crate
//!
//! Configuration, the health/WebSocket listener, transports, the realtime
//! bridge and the console loop. The `agent` binary is a thin wrapper that
//! picks a run mode and calls into [`runtime`].

pub mod audio_utils;
pub mod config;
pub mod console;
pub mod handlers;
pub mod realtime;
pub mod router;
pub mod runtime;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
