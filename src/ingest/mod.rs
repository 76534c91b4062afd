//! Ingestion stage: fetch the hourly forecast and land it in staging.
//!
//! One invocation makes one fetch, at most one staging write, and exactly
//! one notification publish. Nothing is retried; the scheduler simply
//! runs the stage again on its next tick.

pub mod nws;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::logging::{self, Component};
use crate::model::{
    CONTENT_TYPE_JSON, FetchError, NotificationEvent, ObjectRef, SUBJECT_INGESTION_OK, StageError,
    StageOutcome, StoreError,
};
use crate::notify::Notifier;
use crate::partition::format_staged_key;
use crate::store::BlobStore;

use self::nws::ForecastSource;

pub const INGESTION_OK_MESSAGE: &str = "Data ingested into staging store successfully";

pub struct IngestionStage {
    source: Box<dyn ForecastSource>,
    staging: Arc<dyn BlobStore>,
    staging_bucket: String,
    source_prefix: String,
    notifier: Notifier,
}

impl IngestionStage {
    pub fn new(
        source: Box<dyn ForecastSource>,
        staging: Arc<dyn BlobStore>,
        staging_bucket: impl Into<String>,
        source_prefix: impl Into<String>,
        notifier: Notifier,
    ) -> Self {
        Self {
            source,
            staging,
            staging_bucket: staging_bucket.into(),
            source_prefix: source_prefix.into(),
            notifier,
        }
    }

    /// Runs the stage stamped with the current UTC time.
    pub fn run(&self) -> StageOutcome {
        self.run_at(Utc::now())
    }

    /// Runs the stage with an explicit clock.
    pub fn run_at(&self, now: DateTime<Utc>) -> StageOutcome {
        self.run_reporting(now).0
    }

    /// Like [`run_at`](Self::run_at), but also reports the staged object on
    /// success so a local runner can hand it to the validation stage.
    pub fn run_reporting(&self, now: DateTime<Utc>) -> (StageOutcome, Option<ObjectRef>) {
        let (event, staged) = match self.ingest(now) {
            Ok(staged) => {
                logging::info(Component::Ingest, Some(&staged.key), INGESTION_OK_MESSAGE);
                let event = NotificationEvent::success(SUBJECT_INGESTION_OK, INGESTION_OK_MESSAGE);
                (event, Some(staged))
            }
            Err(err) => {
                logging::log_stage_failure(Component::Ingest, None, &err);
                (NotificationEvent::failure(&err), None)
            }
        };
        self.notifier.notify(&event);
        (event.outcome, staged)
    }

    fn ingest(&self, now: DateTime<Utc>) -> Result<ObjectRef, StageError> {
        logging::debug(
            Component::Ingest,
            None,
            &format!("Fetching forecast from {}", self.source.describe()),
        );
        let document = self.source.fetch()?;
        if document.is_empty() {
            return Err(FetchError::Empty.into());
        }

        let key = format_staged_key(&self.source_prefix, now);
        let body = document
            .to_json_bytes()
            .map_err(|e| StageError::StoreWrite(StoreError::Io(e.to_string())))?;

        logging::debug(
            Component::Store,
            Some(&key),
            &format!(
                "Writing {} bytes ({} periods) to {}",
                body.len(),
                document.period_count(),
                self.staging_bucket
            ),
        );
        self.staging
            .put(&self.staging_bucket, &key, &body, CONTENT_TYPE_JSON)
            .map_err(StageError::StoreWrite)?;

        Ok(ObjectRef::new(self.staging_bucket.clone(), key))
    }
}
