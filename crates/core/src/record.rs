//! Per-session transcript and usage record.

use crate::executor::{FunctionCallRequest, FunctionCallResult};
use crate::mode::Mode;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    /// Position in the transcript, starting at 0.
    pub seq: u64,
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallEntry {
    pub request: FunctionCallRequest,
    pub result: FunctionCallResult,
    pub latency_ms: u64,
}

/// Token counters as reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Session record is already closed")]
pub struct RecordClosed;

/// Append-only record of one conversation.
///
/// Turns keep strictly increasing timestamps even if the wall clock steps
/// backwards, and nothing can be appended once the record is closed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    session_id: Uuid,
    mode: Mode,
    started_at: DateTime<Utc>,
    #[serde(skip)]
    started: Instant,
    turns: Vec<Turn>,
    calls: Vec<CallEntry>,
    usage: Usage,
    ended_at: Option<DateTime<Utc>>,
    duration_ms: Option<u64>,
}

impl SessionRecord {
    pub fn new(session_id: Uuid, mode: Mode) -> Self {
        Self {
            session_id,
            mode,
            started_at: Utc::now(),
            started: Instant::now(),
            turns: Vec::new(),
            calls: Vec::new(),
            usage: Usage::default(),
            ended_at: None,
            duration_ms: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn calls(&self) -> &[CallEntry] {
        &self.calls
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn push_turn(&mut self, speaker: Speaker, content: String) -> Result<&Turn, RecordClosed> {
        self.ensure_open()?;
        let now = Utc::now();
        let timestamp = match self.turns.last() {
            Some(last) if now <= last.timestamp => last.timestamp + TimeDelta::microseconds(1),
            _ => now,
        };
        let seq = self.turns.len() as u64;
        self.turns.push(Turn {
            seq,
            speaker,
            content,
            timestamp,
        });
        Ok(&self.turns[self.turns.len() - 1])
    }

    pub fn push_call(&mut self, entry: CallEntry) -> Result<(), RecordClosed> {
        self.ensure_open()?;
        self.calls.push(entry);
        Ok(())
    }

    pub fn add_usage(&mut self, usage: Usage) -> Result<(), RecordClosed> {
        self.ensure_open()?;
        self.usage.add(usage);
        Ok(())
    }

    /// Stamps the end time and duration. Closing twice is an error.
    pub fn close(&mut self) -> Result<(), RecordClosed> {
        self.ensure_open()?;
        self.ended_at = Some(Utc::now());
        self.duration_ms = Some(self.started.elapsed().as_millis() as u64);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RecordClosed> {
        if self.is_closed() {
            Err(RecordClosed)
        } else {
            Ok(())
        }
    }
}
