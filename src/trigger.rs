//! Object-created trigger payloads.
//!
//! The validation stage is started by a storage event naming the new
//! object. Events arrive either directly as `{bucket, key}` or wrapped in
//! an S3-style notification document:
//!
//! ```json
//! {"Records": [{"s3": {"bucket": {"name": "staging"},
//!                      "object": {"key": "nyc/2024-03-01-05-00-00.json"}}}]}
//! ```
//!
//! Keys in S3 notifications are form-URL-encoded (`+` for space, `%XX`
//! escapes) and are decoded here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ObjectRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.bucket.clone(), self.key.clone())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TriggerError {
    #[error("event payload is not valid JSON: {0}")]
    Parse(String),
    #[error("event payload has no records")]
    NoRecords,
    #[error("object key is not valid URL encoding: {0}")]
    BadKeyEncoding(String),
}

// S3 notification shape; only the fields the pipeline needs.

#[derive(Debug, Deserialize)]
struct S3Notification {
    #[serde(rename = "Records", default)]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Parses every record of an S3-style notification.
pub fn parse_s3_notification(payload: &str) -> Result<Vec<ObjectCreatedEvent>, TriggerError> {
    let notification: S3Notification =
        serde_json::from_str(payload).map_err(|e| TriggerError::Parse(e.to_string()))?;
    if notification.records.is_empty() {
        return Err(TriggerError::NoRecords);
    }
    notification
        .records
        .into_iter()
        .map(|record| {
            Ok(ObjectCreatedEvent {
                bucket: record.s3.bucket.name,
                key: decode_object_key(&record.s3.object.key)?,
            })
        })
        .collect()
}

/// Accepts either an S3 notification or a bare `{bucket, key}` object.
pub fn parse_event_payload(payload: &str) -> Result<Vec<ObjectCreatedEvent>, TriggerError> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| TriggerError::Parse(e.to_string()))?;
    if value.get("Records").is_some() {
        return parse_s3_notification(payload);
    }
    serde_json::from_value::<ObjectCreatedEvent>(value)
        .map(|event| vec![event])
        .map_err(|e| TriggerError::Parse(e.to_string()))
}

/// Decodes a form-URL-encoded object key.
pub fn decode_object_key(raw: &str) -> Result<String, TriggerError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| TriggerError::BadKeyEncoding(raw.to_string()))?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| TriggerError::BadKeyEncoding(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const S3_EVENT: &str = r#"{
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": {"name": "datafoundry-staging", "arn": "arn:aws:s3:::datafoundry-staging"},
                "object": {"key": "nyc/2024-03-01-05-00-00.json", "size": 48213}
            }
        }]
    }"#;

    #[test]
    fn test_parse_s3_notification() {
        let events = parse_s3_notification(S3_EVENT).unwrap();
        assert_eq!(
            events,
            vec![ObjectCreatedEvent::new("datafoundry-staging", "nyc/2024-03-01-05-00-00.json")]
        );
    }

    #[test]
    fn test_empty_records_is_error() {
        assert_eq!(parse_s3_notification(r#"{"Records": []}"#), Err(TriggerError::NoRecords));
    }

    #[test]
    fn test_bare_event_payload() {
        let events = parse_event_payload(r#"{"bucket": "staging", "key": "nyc/a.json"}"#).unwrap();
        assert_eq!(events, vec![ObjectCreatedEvent::new("staging", "nyc/a.json")]);
    }

    #[test]
    fn test_event_payload_dispatches_on_records() {
        let events = parse_event_payload(S3_EVENT).unwrap();
        assert_eq!(events[0].bucket, "datafoundry-staging");
    }

    #[test]
    fn test_garbage_payload_is_parse_error() {
        assert!(matches!(parse_event_payload("not json"), Err(TriggerError::Parse(_))));
        assert!(matches!(parse_event_payload(r#"{"bucket": 1}"#), Err(TriggerError::Parse(_))));
    }

    #[test]
    fn test_decode_object_key() {
        assert_eq!(decode_object_key("nyc/2024-03-01-05-00-00.json").unwrap(), "nyc/2024-03-01-05-00-00.json");
        assert_eq!(decode_object_key("new+york/a%3Db.json").unwrap(), "new york/a=b.json");
        assert!(decode_object_key("bad%zz").is_err());
        assert!(decode_object_key("trailing%4").is_err());
    }

    #[test]
    fn test_signed_escape_is_rejected() {
        assert!(matches!(decode_object_key("nyc/%+f.json"), Err(TriggerError::BadKeyEncoding(_))));
        assert!(matches!(decode_object_key("nyc/%-1.json"), Err(TriggerError::BadKeyEncoding(_))));
    }
}
