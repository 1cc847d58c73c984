//! Call events sent to the logging sink.
//!
//! Every event is wrapped in an envelope carrying the API version; the
//! `event_type` tag sits next to the event fields in the serialized JSON.

use serde::{Deserialize, Serialize};

use super::transfer::TransferState;

/// Version of the event payload contract
pub const API_VERSION: u32 = 1;

/// Versioned event as posted to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub api_version: u32,

    #[serde(flatten)]
    pub event: CallEvent,
}

/// The two events a call produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum CallEvent {
    #[serde(rename = "ASTERISK_CALL_START")]
    CallStart {
        call_id: String,
        /// Recording file name
        recording: String,
        server_ip: String,
        extension: String,
        start_time: String,
    },

    #[serde(rename = "ASTERISK_CALL_END")]
    CallEnd {
        call_id: String,
        transfer_state_name: TransferState,
        end_time: String,
    },
}

impl EventEnvelope {
    pub fn new(event: CallEvent) -> Self {
        Self {
            api_version: API_VERSION,
            event,
        }
    }

    pub fn call_start(
        call_id: impl Into<String>,
        recording: impl Into<String>,
        server_ip: impl Into<String>,
        extension: impl Into<String>,
        start_time: impl Into<String>,
    ) -> Self {
        Self::new(CallEvent::CallStart {
            call_id: call_id.into(),
            recording: recording.into(),
            server_ip: server_ip.into(),
            extension: extension.into(),
            start_time: start_time.into(),
        })
    }

    pub fn call_end(
        call_id: impl Into<String>,
        transfer_state: TransferState,
        end_time: impl Into<String>,
    ) -> Self {
        Self::new(CallEvent::CallEnd {
            call_id: call_id.into(),
            transfer_state_name: transfer_state,
            end_time: end_time.into(),
        })
    }

    /// Value of the `event_type` tag
    pub fn event_type(&self) -> &'static str {
        match self.event {
            CallEvent::CallStart { .. } => "ASTERISK_CALL_START",
            CallEvent::CallEnd { .. } => "ASTERISK_CALL_END",
        }
    }
}
