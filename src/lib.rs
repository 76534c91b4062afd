//! Scheduled hourly forecast ingestion with a validation/partitioning stage.
//!
//! Two independently triggered stages:
//! - [`ingest::IngestionStage`] fetches the api.weather.gov hourly forecast
//!   and lands it as raw JSON in a staging bucket.
//! - [`quality::ValidationStage`] runs once per staged object, flattens the
//!   forecast periods, derives Celsius temperatures, and writes a CSV under
//!   a `year=/month=/date=/hour=` partition of the validated bucket.
//!
//! Both stages publish exactly one notification per invocation and return a
//! [`model::StageOutcome`].

pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod notify;
pub mod partition;
pub mod pipeline;
pub mod quality;
pub mod store;
pub mod trigger;
