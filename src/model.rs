//! Core data types for the weather forecast pipeline.
//!
//! This module defines the shared domain model imported by both stages:
//! the raw forecast document, object references, stage outcomes,
//! notification events, and the error taxonomy. It contains no I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

// ---------------------------------------------------------------------------
// Forecast document
// ---------------------------------------------------------------------------

/// The raw hourly forecast response from api.weather.gov.
///
/// Held as an order-preserving JSON value so that staging writes every
/// field exactly as the API returned it. Only `properties.periods` is
/// interpreted downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDocument(Value);

impl ForecastDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// See [`is_empty_payload`].
    pub fn is_empty(&self) -> bool {
        is_empty_payload(&self.0)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The `properties.periods` list, if present and an array.
    pub fn periods(&self) -> Option<&Vec<Value>> {
        periods_of(&self.0)
    }

    pub fn period_count(&self) -> usize {
        self.periods().map(Vec::len).unwrap_or(0)
    }

    /// Serializes the full document as compact JSON text.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

/// Looks up `properties.periods` on an arbitrary JSON payload.
pub fn periods_of(value: &Value) -> Option<&Vec<Value>> {
    value
        .get("properties")
        .and_then(|p| p.get("periods"))
        .and_then(Value::as_array)
}

/// Returns `true` for payloads that carry no content at all:
/// `null`, `{}`, `[]`, `""`, `false` and numeric zero.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Object references
// ---------------------------------------------------------------------------

/// A blob identified by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

// ---------------------------------------------------------------------------
// Stage outcome
// ---------------------------------------------------------------------------

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;

/// The structured result each stage returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: u16,
    pub message: String,
}

impl StageOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILED,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub const SUBJECT_INGESTION_OK: &str = "Data Ingestion Successful";
pub const SUBJECT_QUALITY_OK: &str = "Data Quality Check Passed";

/// One message destined for the notification topic. Exactly one is built
/// per stage invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEvent {
    pub subject: String,
    pub message: String,
    pub outcome: StageOutcome,
}

impl NotificationEvent {
    pub fn success(subject: &str, message: &str) -> Self {
        Self {
            subject: subject.to_string(),
            message: message.to_string(),
            outcome: StageOutcome::success(message),
        }
    }

    /// Builds the failure notification for a stage error. The subject names
    /// the failure kind; the message carries the full error detail.
    pub fn failure(err: &StageError) -> Self {
        let message = err.to_string();
        Self {
            subject: err.kind().subject().to_string(),
            outcome: StageOutcome::failure(message.clone()),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from the remote forecast endpoint.
#[derive(Debug, Error, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Request failed: {0}")]
    Request(String),
    /// The response body was not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The response parsed but carried no content.
    #[error("No data fetched from API")]
    Empty,
}

/// Errors from a blob store.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("I/O error: {0}")]
    Io(String),
    /// The store refused the request (bad key, missing bucket, ...).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors raised while normalizing or partitioning a staged object.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("malformed staged key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },
    #[error("payload has no properties.periods list")]
    MissingPeriods,
    #[error("forecast period {index} is not an object")]
    InvalidPeriod { index: usize },
    #[error("forecast period {index} has a non-numeric temperature: {value}")]
    InvalidTemperature { index: usize, value: String },
    #[error("required column {0:?} is missing")]
    MissingColumn(&'static str),
    #[error("flattened column name {0:?} is produced by more than one field")]
    ColumnCollision(String),
}

/// Errors from a notification sink.
#[derive(Debug, Error, PartialEq)]
#[error("notification publish failed: {0}")]
pub struct NotifyError(pub String);

/// The failure kinds a stage can end in. Each maps to one notification
/// subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    StoreWrite,
    Read,
    EmptyData,
    Transform,
    Write,
}

impl ErrorKind {
    pub fn subject(self) -> &'static str {
        match self {
            ErrorKind::Fetch => "Data Ingestion Failed",
            ErrorKind::StoreWrite => "Data Ingestion Failed: Staging Write Error",
            ErrorKind::Read => "Data Quality Check Failed: Read Error",
            ErrorKind::EmptyData => "Data Quality Check Failed: Empty Data",
            ErrorKind::Transform => "Data Quality Check Failed: Transform Error",
            ErrorKind::Write => "Data Quality Check Failed: Write Error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Fetch => write!(f, "FetchError"),
            ErrorKind::StoreWrite => write!(f, "StoreWriteError"),
            ErrorKind::Read => write!(f, "ReadError"),
            ErrorKind::EmptyData => write!(f, "EmptyDataError"),
            ErrorKind::Transform => write!(f, "TransformError"),
            ErrorKind::Write => write!(f, "WriteError"),
        }
    }
}

/// The single error boundary of a stage invocation.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Error fetching data from API: {0}")]
    Fetch(#[from] FetchError),
    #[error("Error ingesting data into staging store: {0}")]
    StoreWrite(StoreError),
    #[error("Error reading data from staging store: {0}")]
    Read(String),
    #[error("Data quality check failed. Data is empty.")]
    EmptyData,
    #[error("Error transforming data: {0}")]
    Transform(#[from] TransformError),
    #[error("Error writing data to partitioned storage: {0}")]
    Write(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Fetch(_) => ErrorKind::Fetch,
            StageError::StoreWrite(_) => ErrorKind::StoreWrite,
            StageError::Read(_) => ErrorKind::Read,
            StageError::EmptyData => ErrorKind::EmptyData,
            StageError::Transform(_) => ErrorKind::Transform,
            StageError::Write(_) => ErrorKind::Write,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payloads_are_detected() {
        for value in [json!(null), json!({}), json!([]), json!(""), json!(false), json!(0)] {
            assert!(is_empty_payload(&value), "{} should count as empty", value);
        }
        for value in [json!({"a": 1}), json!([1]), json!("x"), json!(true), json!(3)] {
            assert!(!is_empty_payload(&value), "{} should not count as empty", value);
        }
    }

    #[test]
    fn test_empty_document_maps_to_ingestion_failure() {
        assert!(ForecastDocument::new(json!({})).is_empty());
        assert!(!ForecastDocument::new(json!({"type": "Feature"})).is_empty());
        let err = StageError::from(FetchError::Empty);
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert_eq!(err.kind().subject(), "Data Ingestion Failed");
    }

    #[test]
    fn test_period_count_reads_nested_list() {
        let doc = ForecastDocument::new(json!({"properties": {"periods": [{}, {}, {}]}}));
        assert_eq!(doc.period_count(), 3);
        assert_eq!(ForecastDocument::new(json!({"type": "Feature"})).period_count(), 0);
    }

    #[test]
    fn test_failure_event_uses_kind_subject_and_error_detail() {
        let err = StageError::Fetch(FetchError::Http(503));
        let event = NotificationEvent::failure(&err);
        assert_eq!(event.subject, "Data Ingestion Failed");
        assert_eq!(event.message, "Error fetching data from API: HTTP error: 503");
        assert_eq!(event.outcome.status, STATUS_FAILED);
    }

    #[test]
    fn test_empty_data_message_states_quality_failure() {
        let event = NotificationEvent::failure(&StageError::EmptyData);
        assert_eq!(event.subject, "Data Quality Check Failed: Empty Data");
        assert!(event.message.contains("Data is empty"));
    }

    #[test]
    fn test_every_kind_has_a_distinct_subject() {
        let kinds = [
            ErrorKind::Fetch,
            ErrorKind::StoreWrite,
            ErrorKind::Read,
            ErrorKind::EmptyData,
            ErrorKind::Transform,
            ErrorKind::Write,
        ];
        let mut subjects: Vec<&str> = kinds.iter().map(|k| k.subject()).collect();
        subjects.push(SUBJECT_INGESTION_OK);
        subjects.push(SUBJECT_QUALITY_OK);
        let count = subjects.len();
        subjects.sort();
        subjects.dedup();
        assert_eq!(subjects.len(), count);
    }

    #[test]
    fn test_outcome_serializes_status_and_message() {
        let text = serde_json::to_string(&StageOutcome::success("ok")).unwrap();
        assert_eq!(text, r#"{"status":200,"message":"ok"}"#);
    }
}
