//! Terminal transfer states and dial outcome classification.
//!
//! `Dial()` leaves its result in the `DIALSTATUS` channel variable. The
//! controller maps that value onto a [`TransferState`], which decides whether
//! the caller hears the busy prompt and is reported in the end-of-call event.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the bridging attempt of a call concluded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
    /// Initial placeholder before the bridge step ran
    #[default]
    #[serde(rename = "PREDIAL")]
    Predial,

    /// The call ended before the bridge step could run
    #[serde(rename = "PREDIAL_FAILURE")]
    PredialFailure,

    #[serde(rename = "NOANSWER")]
    NoAnswer,

    #[serde(rename = "CHANUNAVAIL")]
    ChanUnavail,

    #[serde(rename = "DONTCALL")]
    DontCall,

    #[serde(rename = "TORTURE")]
    Torture,

    #[serde(rename = "INVALIDARGS")]
    InvalidArgs,

    #[serde(rename = "CANCEL")]
    Cancel,

    /// Peer reported congestion
    #[serde(rename = "BUSY")]
    Busy,

    /// Peer answered
    #[serde(rename = "SUCCESS")]
    Success,
}

impl TransferState {
    /// Classify a `DIALSTATUS` value. Unknown or absent values count as no answer.
    pub fn classify(dial_status: Option<&str>) -> Self {
        match dial_status.map(str::trim) {
            Some("ANSWER") => Self::Success,
            Some("NOANSWER") => Self::NoAnswer,
            Some("CHANUNAVAIL") => Self::ChanUnavail,
            Some("DONTCALL") => Self::DontCall,
            Some("TORTURE") => Self::Torture,
            Some("INVALIDARGS") => Self::InvalidArgs,
            Some("CANCEL") => Self::Cancel,
            Some("CONGESTION") => Self::Busy,
            _ => Self::NoAnswer,
        }
    }

    /// Wire name used in logs and in the `transfer_state_name` event field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predial => "PREDIAL",
            Self::PredialFailure => "PREDIAL_FAILURE",
            Self::NoAnswer => "NOANSWER",
            Self::ChanUnavail => "CHANUNAVAIL",
            Self::DontCall => "DONTCALL",
            Self::Torture => "TORTURE",
            Self::InvalidArgs => "INVALIDARGS",
            Self::Cancel => "CANCEL",
            Self::Busy => "BUSY",
            Self::Success => "SUCCESS",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Predial)
    }

    /// Every outcome except a successful bridge gets the busy prompt
    pub fn plays_busy_prompt(&self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
