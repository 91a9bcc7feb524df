//! Queue definitions and statistics tracking.
//!
//! Queues are named, per-tenant containers for messages. Each queue carries
//! two delivery defaults that apply when the wire request does not override
//! them: a visibility timeout (how long a dequeued message stays invisible)
//! and a delay (how long a new message stays undeliverable).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::message::MessageState;

pub const MAX_QUEUE_NAME_LEN: usize = 80;

/// A message queue scoped to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Queue {
    pub id: u64,
    pub tenant: u64,
    /// Unique within the tenant, `[A-Za-z0-9_-]{1,80}`.
    pub name: String,
    /// Default lease length in seconds for messages dequeued from this queue.
    pub visibility_timeout: u64,
    /// Default initial invisibility in seconds for new messages.
    pub delay_seconds: u64,
    pub created_at: i64,
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Returns whether `name` is a legal queue name.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_QUEUE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Per-queue message counters, grouped by lifecycle state.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct QueueStats {
    /// Messages that are not tombstoned.
    pub total_messages: u64,
    pub counts: HashMap<MessageState, u64>,
}

impl QueueStats {
    pub fn count(&self, state: MessageState) -> u64 {
        self.counts.get(&state).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(valid_name("orders"));
        assert!(valid_name("orders-dead_letter"));
        assert!(valid_name("Q1"));
        assert!(valid_name(&"a".repeat(80)));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!valid_name(""));
        assert!(!valid_name(&"a".repeat(81)));
        assert!(!valid_name("orders.fifo"));
        assert!(!valid_name("orders queue"));
        assert!(!valid_name("orders/1"));
    }
}
