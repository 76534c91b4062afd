//! Validation and partitioning stage.
//!
//! Triggered once per newly staged object. Reads the raw forecast, rejects
//! empty payloads, normalizes the periods into a table, and writes it as
//! CSV under a time partition derived from the staged key:
//!
//! ```text
//! staging:   nyc/2024-03-01-05-00-00.json
//! validated: nyc/year=2024/month=03/date=01/hour=05/weather.csv
//! ```
//!
//! Submodules:
//! - `normalize`: period flattening and derived temperature columns.
//! - `tabular`: CSV rendering.

pub mod normalize;
pub mod tabular;

use std::sync::Arc;

use serde_json::Value;

use crate::logging::{self, Component};
use crate::model::{
    CONTENT_TYPE_CSV, NotificationEvent, SUBJECT_QUALITY_OK, StageError, StageOutcome,
    TransformError, is_empty_payload, periods_of,
};
use crate::notify::Notifier;
use crate::partition::StagedKey;
use crate::store::BlobStore;

use self::normalize::normalize_periods;

pub const QUALITY_OK_MESSAGE: &str = "Data quality check passed. Data written to partitioned storage.";

pub struct ValidationStage {
    staging: Arc<dyn BlobStore>,
    validated: Arc<dyn BlobStore>,
    validated_bucket: String,
    notifier: Notifier,
}

/// A CSV ready to be written, with where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput {
    pub key: String,
    pub csv: String,
    pub row_count: usize,
}

impl ValidationStage {
    pub fn new(
        staging: Arc<dyn BlobStore>,
        validated: Arc<dyn BlobStore>,
        validated_bucket: impl Into<String>,
        notifier: Notifier,
    ) -> Self {
        Self {
            staging,
            validated,
            validated_bucket: validated_bucket.into(),
            notifier,
        }
    }

    /// Processes the staged object at `(bucket, key)`.
    pub fn run(&self, bucket: &str, key: &str) -> StageOutcome {
        let event = match self.validate(bucket, key) {
            Ok(written) => {
                logging::info(
                    Component::Quality,
                    Some(key),
                    &format!(
                        "{} rows written to {}/{}",
                        written.row_count, self.validated_bucket, written.key
                    ),
                );
                NotificationEvent::success(SUBJECT_QUALITY_OK, QUALITY_OK_MESSAGE)
            }
            Err(err) => {
                logging::log_stage_failure(Component::Quality, Some(key), &err);
                NotificationEvent::failure(&err)
            }
        };
        self.notifier.notify(&event);
        event.outcome
    }

    fn validate(&self, bucket: &str, key: &str) -> Result<ValidatedOutput, StageError> {
        let payload = self.read(bucket, key)?;
        if is_empty_payload(&payload) {
            return Err(StageError::EmptyData);
        }

        let output = transform(key, &payload)?;

        self.validated
            .put(&self.validated_bucket, &output.key, output.csv.as_bytes(), CONTENT_TYPE_CSV)
            .map_err(|e| StageError::Write(e.to_string()))?;
        Ok(output)
    }

    fn read(&self, bucket: &str, key: &str) -> Result<Value, StageError> {
        let bytes = self
            .staging
            .get(bucket, key)
            .map_err(|e| StageError::Read(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StageError::Read(format!("invalid JSON: {}", e)))
    }
}

/// Normalizes a parsed staged payload and works out its output key.
///
/// An empty `properties.periods` list is treated as empty data; a payload
/// without the list at all is a schema problem.
pub fn transform(key: &str, payload: &Value) -> Result<ValidatedOutput, StageError> {
    let staged = StagedKey::parse(key)?;
    let periods = periods_of(payload).ok_or(TransformError::MissingPeriods)?;
    if periods.is_empty() {
        return Err(StageError::EmptyData);
    }

    let extract_time = staged.extract_time()?;
    let table = normalize_periods(periods, extract_time)?;
    let output_key = staged.output_key()?;

    Ok(ValidatedOutput {
        key: output_key,
        row_count: table.len(),
        csv: tabular::to_csv(&table),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
