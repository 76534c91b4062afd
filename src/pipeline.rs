//! Local wiring of the two stages.
//!
//! In production the scheduler and the storage event layer are external.
//! `LocalPipeline` stands in for both: it builds the collaborators from a
//! [`PipelineConfig`], runs ingestion on demand or on an interval, and
//! turns each object written to the staging bucket into exactly one
//! validation run.

use std::sync::Arc;
use std::thread;

use crate::config::PipelineConfig;
use crate::ingest::IngestionStage;
use crate::ingest::nws::NwsClient;
use crate::logging::{self, Component};
use crate::model::StageOutcome;
use crate::notify::{LogSink, NotificationSink, Notifier, WebhookSink};
use crate::quality::ValidationStage;
use crate::store::{BlobStore, EventRecordingStore, FsBlobStore};
use crate::trigger::ObjectCreatedEvent;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to set up forecast client: {0}")]
    Fetch(#[from] crate::model::FetchError),
    #[error("failed to set up notification sink: {0}")]
    Notify(#[from] crate::model::NotifyError),
}

pub struct LocalPipeline {
    store: Arc<EventRecordingStore<FsBlobStore>>,
    ingestion: IngestionStage,
    validation: ValidationStage,
    config: PipelineConfig,
}

impl LocalPipeline {
    pub fn from_config(config: PipelineConfig) -> Result<Self, SetupError> {
        let client = NwsClient::new(&config.forecast_url, &config.user_agent, config.http_timeout())?;
        let sink: Arc<dyn NotificationSink> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url, config.http_timeout())?),
            None => Arc::new(LogSink),
        };
        Ok(Self::with_parts(config, Box::new(client), sink))
    }

    /// Builds the pipeline around an explicit forecast source and sink.
    pub fn with_parts(
        config: PipelineConfig,
        source: Box<dyn crate::ingest::nws::ForecastSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(EventRecordingStore::new(
            FsBlobStore::new(&config.store_root),
            config.staging_bucket.clone(),
        ));
        let notifier = Notifier::new(sink, config.notify_topic.clone());
        let shared: Arc<dyn BlobStore> = store.clone();

        let ingestion = IngestionStage::new(
            source,
            shared.clone(),
            config.staging_bucket.clone(),
            config.source_prefix.clone(),
            notifier.clone(),
        );
        let validation = ValidationStage::new(
            shared.clone(),
            shared,
            config.validated_bucket.clone(),
            notifier,
        );

        Self {
            store,
            ingestion,
            validation,
            config,
        }
    }

    /// One ingestion run. Any object it stages is queued for validation.
    pub fn ingest(&self) -> StageOutcome {
        self.ingestion.run()
    }

    pub fn validate(&self, bucket: &str, key: &str) -> StageOutcome {
        self.validation.run(bucket, key)
    }

    /// Validates each event's object, in order.
    pub fn dispatch(&self, events: &[ObjectCreatedEvent]) -> Vec<StageOutcome> {
        events
            .iter()
            .map(|event| self.validation.run(&event.bucket, &event.key))
            .collect()
    }

    /// Ingest, then validate whatever landed in staging.
    pub fn run_cycle(&self) -> Vec<StageOutcome> {
        let mut outcomes = vec![self.ingest()];
        let events = self.store.drain_events();
        outcomes.extend(self.dispatch(&events));

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        logging::log_run_summary(outcomes.len(), outcomes.len() - failed, failed);
        outcomes
    }

    /// Runs cycles forever, sleeping the configured interval between
    /// them. Each cycle's outcomes go to `on_cycle`.
    pub fn run_scheduled<F>(&self, mut on_cycle: F)
    where
        F: FnMut(&[StageOutcome]),
    {
        let interval = self.config.schedule_interval();
        logging::info(
            Component::System,
            None,
            &format!("Scheduling ingestion every {}s", interval.as_secs()),
        );
        loop {
            let outcomes = self.run_cycle();
            on_cycle(&outcomes);
            thread::sleep(interval);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::nws::ForecastSource;
    use crate::model::{FetchError, ForecastDocument};
    use crate::notify::MemorySink;
    use serde_json::json;

    struct FixedSource;

    impl ForecastSource for FixedSource {
        fn fetch(&self) -> Result<ForecastDocument, FetchError> {
            Ok(ForecastDocument::new(json!({"properties": {"periods": [
                {"number": 1, "temperature": 50, "temperatureUnit": "F"}
            ]}})))
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn test_cycle_ingests_then_validates_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            store_root: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let sink = Arc::new(MemorySink::new());
        let pipeline = LocalPipeline::with_parts(config, Box::new(FixedSource), sink.clone());

        let outcomes = pipeline.run_cycle();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(StageOutcome::is_success), "{:?}", outcomes);
        assert_eq!(
            sink.subjects(),
            vec!["Data Ingestion Successful", "Data Quality Check Passed"]
        );

        let nyc = dir.path().join("weather-validated").join("nyc");
        let year_dir = std::fs::read_dir(&nyc).unwrap().next().unwrap().unwrap();
        assert!(year_dir.file_name().to_string_lossy().starts_with("year="));
    }

    #[test]
    fn test_validated_writes_do_not_queue_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            store_root: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = LocalPipeline::with_parts(config, Box::new(FixedSource), Arc::new(MemorySink::new()));
        pipeline.run_cycle();
        // A second cycle only validates its own newly staged object.
        let outcomes = pipeline.run_cycle();
        assert_eq!(outcomes.len(), 2);
    }
}
