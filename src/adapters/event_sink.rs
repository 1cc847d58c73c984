//! Event-logging sink client.
//!
//! Endpoint: POST <sink url>, JSON body, one attempt per event.
//! Non-2xx responses come back as a [`ReportReceipt`]; only transport and
//! serialization failures are errors.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::EventSinkSettings;
use crate::domain::{EventEnvelope, TransferState};

/// What the sink answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    pub status: u16,
    pub body: String,
}

impl ReportReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Destination for call events
#[async_trait]
pub trait EventReporter: Send + Sync {
    /// Transmit one event
    async fn report(&self, envelope: &EventEnvelope) -> Result<ReportReceipt>;

    async fn report_call_start(
        &self,
        call_id: &str,
        recording_name: &str,
        server_ip: &str,
        extension: &str,
        start_time: &str,
    ) -> Result<ReportReceipt> {
        let envelope =
            EventEnvelope::call_start(call_id, recording_name, server_ip, extension, start_time);
        self.report(&envelope).await
    }

    async fn report_call_end(
        &self,
        call_id: &str,
        terminal_state: TransferState,
        end_time: &str,
    ) -> Result<ReportReceipt> {
        let envelope = EventEnvelope::call_end(call_id, terminal_state, end_time);
        self.report(&envelope).await
    }
}

/// HTTP sink client
pub struct HttpEventReporter {
    url: String,
    client: reqwest::Client,
}

impl HttpEventReporter {
    /// Create a new client
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build event sink HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Create from config
    pub fn from_config(settings: &EventSinkSettings) -> Result<Self> {
        Self::new(settings.url.clone(), settings.timeout)
    }
}

#[async_trait]
impl EventReporter for HttpEventReporter {
    async fn report(&self, envelope: &EventEnvelope) -> Result<ReportReceipt> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(envelope)
            .send()
            .await
            .with_context(|| format!("Failed to send {} event", envelope.event_type()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(status, event_type = envelope.event_type(), "Event sink responded");

        Ok(ReportReceipt { status, body })
    }
}
