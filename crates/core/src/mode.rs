//! Business Verticals
//!
//! A `Mode` selects the persona and the set of backend functions a process
//! serves. It is chosen once at startup and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned whenever a mode name does not match any known vertical.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown mode '{0}'. Expected one of: orders, appointments, leads, airline, jarvis")]
pub struct UnknownModeError(pub String);

/// The business vertical served by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Orders,
    Appointments,
    Leads,
    Airline,
    Jarvis,
}

impl Mode {
    /// Every mode, in a stable order. Startup checks iterate this list.
    pub const ALL: [Mode; 5] = [
        Mode::Orders,
        Mode::Appointments,
        Mode::Leads,
        Mode::Airline,
        Mode::Jarvis,
    ];

    /// The lowercase identifier used in configuration and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Orders => "orders",
            Mode::Appointments => "appointments",
            Mode::Leads => "leads",
            Mode::Airline => "airline",
            Mode::Jarvis => "jarvis",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| UnknownModeError(s.to_string()))
    }
}
