//! Stage notifications.
//!
//! Every stage invocation publishes exactly one [`NotificationEvent`] to a
//! topic through a [`NotificationSink`]. Publish failures are logged and
//! swallowed: the stage outcome reflects the data work, not whether the
//! message was delivered.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::logging::{self, Component};
use crate::model::{NotificationEvent, NotifyError};

/// Publish-subscribe sink.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Binds a sink to one topic.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    topic: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }

    /// Publishes the event once. Returns whether the sink accepted it.
    pub fn notify(&self, event: &NotificationEvent) -> bool {
        match self.sink.publish(&self.topic, &event.subject, &event.message) {
            Ok(()) => {
                logging::debug(
                    Component::Notify,
                    None,
                    &format!("Published {:?} to {}", event.subject, self.topic),
                );
                true
            }
            Err(e) => {
                logging::error(
                    Component::Notify,
                    None,
                    &format!("Dropping notification {:?}: {}", event.subject, e),
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes each notification as a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifyError> {
        logging::info(
            Component::Notify,
            None,
            &format!("[{}] {}: {}", topic, subject, message),
        );
        Ok(())
    }
}

/// A message captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub subject: String,
    pub message: String,
}

/// Records every publish. Can be switched to fail for testing the
/// unhandled-sink path.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<PublishedMessage>>,
    failing: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes still get recorded as attempts, but return an error.
    pub fn fail_publishes(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = true;
        }
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.subject).collect()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .map_err(|_| NotifyError("sink lock poisoned".to_string()))?
            .push(PublishedMessage {
                topic: topic.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            });
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(NotifyError("sink unavailable".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// POSTs `{topic, subject, message}` as JSON to a webhook URL.
pub struct WebhookSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl NotificationSink for WebhookSink {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            topic,
            subject,
            message,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| NotifyError(format!("webhook request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(NotifyError(format!("webhook returned {}", response.status())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
