//! Message model and lifecycle states.
//!
//! A message moves through four states:
//!
//! ```text
//! delayed ──(visible_at elapses)──> visible ──(claim)──> leased ──(delete)──> tombstoned
//!                                      ^                    │
//!                                      └─(visible_at elapses, redelivery)
//! ```
//!
//! `visible_at` does double duty: for `Delayed` it is the delivery time, for
//! `Leased` it is the lease expiry. Lease expiry is evaluated lazily by the
//! claim query, so no background sweeper is required and there is no scheduler
//! drift. Tombstoned rows are logically deleted and never delivered again.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Delayed,
    Visible,
    Leased,
    Tombstoned,
}

/// A typed message attribute value.
///
/// Binary payloads are stored raw; base64 only exists at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Number(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Filter-facing rendering. Binary values compare against their base64
    /// form, which is also how they appear on the wire.
    pub fn as_filter_str(&self) -> String {
        use base64::prelude::*;

        match self {
            Self::String(s) | Self::Number(s) => s.clone(),
            Self::Binary(b) => BASE64_STANDARD.encode(b),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Strictly increasing within a queue. Doubles as the receipt handle.
    pub id: u64,
    pub queue: u64,
    pub body: Vec<u8>,
    pub state: MessageState,
    /// Unix milliseconds. Delivery eligibility time while `Delayed` or
    /// `Visible`, lease expiry while `Leased`.
    pub visible_at: i64,
    /// Lease length in seconds applied when this message is claimed without a
    /// per-receive override.
    pub visibility_timeout: u64,
    pub enqueued_at: i64,
    pub deliveries: u64,

    #[sqlx(skip)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Criteria for the observability-only message filter.
///
/// All `kv` pairs must match an attribute of the same name; a non-zero
/// `message_id` additionally pins the exact message.
#[derive(Debug, Default, Clone)]
pub struct FilterCriteria {
    pub message_id: Option<u64>,
    pub kv: HashMap<String, String>,
}

impl FilterCriteria {
    /// Parses the dashboard filter grammar: whitespace-separated terms, where
    /// a bare integer selects a message id and `k=v` terms match attributes.
    pub fn parse(input: &str) -> Self {
        let mut criteria = Self::default();

        for field in input.split_whitespace() {
            if let Ok(id) = field.parse::<u64>() {
                criteria.message_id = Some(id);
            } else if let Some((k, v)) = field.split_once('=') {
                criteria
                    .kv
                    .insert(k.trim().to_owned(), v.trim().to_owned());
            }
        }

        criteria
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(id) = self.message_id {
            if message.id != id {
                return false;
            }
        }

        self.kv.iter().all(|(k, v)| {
            message
                .attributes
                .get(k)
                .is_some_and(|attr| attr.as_filter_str() == *v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with(attrs: &[(&str, AttributeValue)]) -> Message {
        Message {
            id: 7,
            queue: 1,
            body: b"payload".to_vec(),
            state: MessageState::Visible,
            visible_at: 0,
            visibility_timeout: 30,
            enqueued_at: 0,
            deliveries: 0,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_filter() {
        let criteria = FilterCriteria::parse("42 env=prod  region = us");
        assert_eq!(criteria.message_id, Some(42));
        assert_eq!(criteria.kv.get("env").map(String::as_str), Some("prod"));
        // "region = us" splits into three fields, only "=" carrying terms count
        assert!(!criteria.kv.contains_key("region"));

        let criteria = FilterCriteria::parse("region=us-east-1");
        assert_eq!(criteria.message_id, None);
        assert_eq!(
            criteria.kv.get("region").map(String::as_str),
            Some("us-east-1")
        );
    }

    #[test]
    fn test_filter_matches_all_pairs() {
        let msg = message_with(&[
            ("env", AttributeValue::String("prod".into())),
            ("attempt", AttributeValue::Number("3".into())),
        ]);

        let mut criteria = FilterCriteria::default();
        criteria.kv.insert("env".into(), "prod".into());
        assert!(criteria.matches(&msg));

        criteria.kv.insert("attempt".into(), "3".into());
        assert!(criteria.matches(&msg));

        criteria.kv.insert("missing".into(), "x".into());
        assert!(!criteria.matches(&msg));
    }

    #[test]
    fn test_filter_by_message_id() {
        let msg = message_with(&[]);

        let criteria = FilterCriteria {
            message_id: Some(7),
            ..Default::default()
        };
        assert!(criteria.matches(&msg));

        let criteria = FilterCriteria {
            message_id: Some(8),
            ..Default::default()
        };
        assert!(!criteria.matches(&msg));
    }

    #[test]
    fn test_binary_filter_uses_base64() {
        use base64::prelude::*;

        let msg = message_with(&[("blob", AttributeValue::Binary(vec![1, 2, 3]))]);

        let mut criteria = FilterCriteria::default();
        criteria
            .kv
            .insert("blob".into(), BASE64_STANDARD.encode([1, 2, 3]));
        assert!(criteria.matches(&msg));
    }
}
