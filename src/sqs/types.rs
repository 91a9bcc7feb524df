//! Wire types for the JSON/1.0 dialect, named exactly as AWS clients send
//! them, plus the MD5 digests responses carry.

use std::collections::{BTreeMap, HashMap};

use url::Url;

use crate::message::AttributeValue;

mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// A typed attribute as it crosses the wire. Binary values travel base64.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase", tag = "DataType")]
pub enum MessageAttributeValue {
    #[serde(rename_all = "PascalCase")]
    String { string_value: String },
    #[serde(rename_all = "PascalCase")]
    Number { string_value: String },
    #[serde(rename_all = "PascalCase")]
    Binary {
        #[serde(with = "base64_bytes")]
        binary_value: Vec<u8>,
    },
}

impl MessageAttributeValue {
    fn data_type(&self) -> &'static str {
        match self {
            Self::String { .. } => "String",
            Self::Number { .. } => "Number",
            Self::Binary { .. } => "Binary",
        }
    }
}

impl From<MessageAttributeValue> for AttributeValue {
    fn from(value: MessageAttributeValue) -> Self {
        match value {
            MessageAttributeValue::String { string_value } => Self::String(string_value),
            MessageAttributeValue::Number { string_value } => Self::Number(string_value),
            MessageAttributeValue::Binary { binary_value } => Self::Binary(binary_value),
        }
    }
}

impl From<AttributeValue> for MessageAttributeValue {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::String(string_value) => Self::String { string_value },
            AttributeValue::Number(string_value) => Self::Number { string_value },
            AttributeValue::Binary(binary_value) => Self::Binary { binary_value },
        }
    }
}

pub fn md5_of_body(body: &[u8]) -> String {
    hex::encode(md5::compute(body).as_slice())
}

/// MD5 over the AWS attribute canonicalization: attributes in lexicographic
/// name order, each contributing length-prefixed name, data type and value,
/// with a transport byte of 1 for String/Number and 2 for Binary. Length
/// prefixes are 4-byte big-endian.
pub fn md5_of_attributes(attributes: &BTreeMap<String, MessageAttributeValue>) -> String {
    fn put(buf: &mut Vec<u8>, bytes: &[u8]) {
        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(bytes);
    }

    let mut buf = Vec::new();

    for (name, value) in attributes {
        put(&mut buf, name.as_bytes());
        put(&mut buf, value.data_type().as_bytes());

        match value {
            MessageAttributeValue::String { string_value }
            | MessageAttributeValue::Number { string_value } => {
                buf.push(1);
                put(&mut buf, string_value.as_bytes());
            }
            MessageAttributeValue::Binary { binary_value } => {
                buf.push(2);
                put(&mut buf, binary_value);
            }
        }
    }

    hex::encode(md5::compute(&buf).as_slice())
}

pub mod send_message {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageRequest {
        pub queue_url: Url,
        pub message_body: String,
        pub delay_seconds: Option<u64>,
        #[serde(default)]
        pub message_attributes: BTreeMap<String, MessageAttributeValue>,
        // Accepted for wire compatibility; this is a standard queue, so
        // deduplication and grouping carry no meaning.
        pub message_deduplication_id: Option<String>,
        pub message_group_id: Option<String>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SendMessageResponse {
        pub message_id: String,
        pub md5_of_message_body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub md5_of_message_attributes: Option<String>,
    }
}

pub mod receive_message {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReceiveMessageRequest {
        pub queue_url: Url,
        pub max_number_of_messages: Option<u64>,
        pub visibility_timeout: Option<u64>,
        pub wait_time_seconds: Option<u64>,
        #[serde(default)]
        pub attribute_names: Vec<String>,
        #[serde(default)]
        pub message_attribute_names: Vec<String>,
        pub receive_request_attempt_id: Option<String>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReceiveMessageResponse {
        pub messages: Vec<Message>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Message {
        pub message_id: String,
        pub receipt_handle: String,
        pub md5_of_body: String,
        pub body: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        pub message_attributes: BTreeMap<String, MessageAttributeValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub md5_of_message_attributes: Option<String>,
    }
}

pub mod delete_message {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageRequest {
        pub queue_url: Url,
        pub receipt_handle: String,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteMessageResponse {}
}

pub mod list_queues {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ListQueuesRequest {
        pub queue_name_prefix: Option<String>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ListQueuesResponse {
        pub queue_urls: Vec<Url>,
    }
}

pub mod create_queue {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct CreateQueueRequest {
        pub queue_name: String,
        #[serde(default)]
        pub attributes: HashMap<String, String>,
        #[serde(default)]
        pub tags: HashMap<String, String>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct CreateQueueResponse {
        pub queue_url: Url,
    }
}

pub mod delete_queue {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteQueueRequest {
        pub queue_url: Url,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeleteQueueResponse {}
}

pub mod purge_queue {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct PurgeQueueRequest {
        pub queue_url: Url,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct PurgeQueueResponse {
        pub success: bool,
    }
}

pub mod get_queue_attributes {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GetQueueAttributesRequest {
        pub queue_url: Url,
        #[serde(default)]
        pub attribute_names: Vec<String>,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GetQueueAttributesResponse {
        pub attributes: HashMap<String, String>,
    }
}

pub mod get_queue_url {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GetQueueUrlRequest {
        pub queue_name: String,
    }

    #[derive(Debug, serde::Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GetQueueUrlResponse {
        pub queue_url: Url,
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum SqsResponse {
    SendMessage(send_message::SendMessageResponse),
    ReceiveMessage(receive_message::ReceiveMessageResponse),
    DeleteMessage(delete_message::DeleteMessageResponse),
    ListQueues(list_queues::ListQueuesResponse),
    CreateQueue(create_queue::CreateQueueResponse),
    DeleteQueue(delete_queue::DeleteQueueResponse),
    PurgeQueue(purge_queue::PurgeQueueResponse),
    GetQueueAttributes(get_queue_attributes::GetQueueAttributesResponse),
    GetQueueUrl(get_queue_url::GetQueueUrlResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_of_body_known_value() {
        assert_eq!(
            md5_of_body(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_attribute_digest_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert(
            "zz".to_owned(),
            MessageAttributeValue::String {
                string_value: "last".to_owned(),
            },
        );
        a.insert(
            "aa".to_owned(),
            MessageAttributeValue::Number {
                string_value: "1".to_owned(),
            },
        );

        let mut b = BTreeMap::new();
        b.insert(
            "aa".to_owned(),
            MessageAttributeValue::Number {
                string_value: "1".to_owned(),
            },
        );
        b.insert(
            "zz".to_owned(),
            MessageAttributeValue::String {
                string_value: "last".to_owned(),
            },
        );

        assert_eq!(md5_of_attributes(&a), md5_of_attributes(&b));
    }

    #[test]
    fn test_attribute_digest_distinguishes_type_and_value() {
        let string_attr = BTreeMap::from([(
            "k".to_owned(),
            MessageAttributeValue::String {
                string_value: "42".to_owned(),
            },
        )]);
        let number_attr = BTreeMap::from([(
            "k".to_owned(),
            MessageAttributeValue::Number {
                string_value: "42".to_owned(),
            },
        )]);
        let binary_attr = BTreeMap::from([(
            "k".to_owned(),
            MessageAttributeValue::Binary {
                binary_value: b"42".to_vec(),
            },
        )]);

        assert_ne!(md5_of_attributes(&string_attr), md5_of_attributes(&number_attr));
        assert_ne!(md5_of_attributes(&string_attr), md5_of_attributes(&binary_attr));
        assert_ne!(md5_of_attributes(&number_attr), md5_of_attributes(&binary_attr));
    }

    #[test]
    fn test_binary_attribute_round_trips_base64() {
        let json = r#"{"DataType":"Binary","BinaryValue":"AQID"}"#;
        let value: MessageAttributeValue = serde_json::from_str(json).unwrap();

        assert_eq!(
            value,
            MessageAttributeValue::Binary {
                binary_value: vec![1, 2, 3]
            }
        );

        let encoded = serde_json::to_string(&value).unwrap();
        assert!(encoded.contains("\"AQID\""));
    }

    #[test]
    fn test_wire_attribute_to_engine_value() {
        let wire = MessageAttributeValue::Number {
            string_value: "42".to_owned(),
        };

        let engine: AttributeValue = wire.clone().into();
        assert_eq!(engine, AttributeValue::Number("42".to_owned()));

        let back: MessageAttributeValue = engine.into();
        assert_eq!(back, wire);
    }
}
