//! Releases function-call results in the order the calls were issued.
//!
//! Calls may finish in any order; a result is held back until every earlier
//! call has been released. Results are matched to calls by `call_id`.

use crate::executor::FunctionCallResult;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

#[derive(Debug, Default)]
pub struct CallSequencer {
    order: VecDeque<String>,
    ready: HashMap<String, FunctionCallResult>,
}

impl CallSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `call_id`. Returns false for a duplicate id.
    pub fn register(&mut self, call_id: &str) -> bool {
        if self.order.iter().any(|id| id == call_id) {
            warn!(call_id, "Function call registered twice");
            return false;
        }
        self.order.push_back(call_id.to_string());
        true
    }

    /// Stores the result for `call_id` and returns every result that can now
    /// be delivered, oldest first.
    pub fn complete(
        &mut self,
        call_id: &str,
        result: FunctionCallResult,
    ) -> Vec<(String, FunctionCallResult)> {
        if !self.order.iter().any(|id| id == call_id) {
            warn!(call_id, "Result for an unregistered function call");
            return Vec::new();
        }
        self.ready.insert(call_id.to_string(), result);

        let mut released = Vec::new();
        while let Some(head) = self.order.front() {
            match self.ready.remove(head) {
                Some(result) => {
                    if let Some(id) = self.order.pop_front() {
                        released.push((id, result));
                    }
                }
                None => break,
            }
        }
        released
    }

    /// Calls issued but not yet released.
    pub fn pending(&self) -> usize {
        self.order.len()
    }

    /// Drops every outstanding slot, returning their ids in issue order.
    pub fn abandon(&mut self) -> Vec<String> {
        self.ready.clear();
        self.order.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(n: i64) -> FunctionCallResult {
        FunctionCallResult::Success { payload: json!(n) }
    }

    #[test]
    fn test_in_order_completion_releases_immediately() {
        let mut seq = CallSequencer::new();
        seq.register("a");
        seq.register("b");

        assert_eq!(seq.complete("a", ok(1)), vec![("a".to_string(), ok(1))]);
        assert_eq!(seq.complete("b", ok(2)), vec![("b".to_string(), ok(2))]);
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn test_out_of_order_completion_is_held_back() {
        let mut seq = CallSequencer::new();
        seq.register("a");
        seq.register("b");
        seq.register("c");

        assert!(seq.complete("c", ok(3)).is_empty());
        assert!(seq.complete("b", ok(2)).is_empty());
        let released = seq.complete("a", ok(1));

        let ids: Vec<&str> = released.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(released[2].1, ok(3));
    }

    #[test]
    fn test_unknown_and_duplicate_ids_are_ignored() {
        let mut seq = CallSequencer::new();
        assert!(seq.register("a"));
        assert!(!seq.register("a"));
        assert!(seq.complete("zzz", ok(0)).is_empty());
        assert_eq!(seq.pending(), 1);
    }

    #[test]
    fn test_abandon_clears_outstanding_calls() {
        let mut seq = CallSequencer::new();
        seq.register("a");
        seq.register("b");
        seq.complete("b", ok(2));

        assert_eq!(seq.abandon(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(seq.pending(), 0);
    }
}
