//! Adapter interfaces for external systems.
//!
//! Adapters give the controller a narrow surface over the telephony control
//! channel (AGI) and the event-logging sink.

pub mod agi;
pub mod event_sink;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use agi::AgiSession;
pub use event_sink::{EventReporter, HttpEventReporter, ReportReceipt};

/// Call-start arguments handed over by the switch (`agi_*` keys)
pub type AgiEnv = HashMap<String, String>;

/// Errors from the telephony control channel
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote party disconnected or the channel is dead
    #[error("remote party hung up")]
    Hangup,

    #[error("{command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("invalid or unknown command: {0}")]
    InvalidCommand(String),

    #[error("invalid command syntax: {0}")]
    Usage(String),

    #[error("unexpected AGI reply: {0}")]
    UnexpectedReply(String),

    #[error("AGI channel I/O failed")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn is_hangup(&self) -> bool {
        matches!(self, Self::Hangup)
    }

    pub(crate) fn failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Asterisk log severities accepted by the `Log` application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Notice,
    Debug,
    Verbose,
    Dtmf,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Debug => "DEBUG",
            Self::Verbose => "VERBOSE",
            Self::Dtmf => "DTMF",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `CHANNEL STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    DownAvailable,
    DownReserved,
    OffHook,
    DigitsDialed,
    Ringing,
    RemoteRinging,
    Up,
    Busy,
    Unknown(i32),
}

impl ChannelStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::DownAvailable,
            1 => Self::DownReserved,
            2 => Self::OffHook,
            3 => Self::DigitsDialed,
            4 => Self::Ringing,
            5 => Self::RemoteRinging,
            6 => Self::Up,
            7 => Self::Busy,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::DownAvailable => 0,
            Self::DownReserved => 1,
            Self::OffHook => 2,
            Self::DigitsDialed => 3,
            Self::Ringing => 4,
            Self::RemoteRinging => 5,
            Self::Up => 6,
            Self::Busy => 7,
            Self::Unknown(code) => *code,
        }
    }

    /// Nothing left to hang up. Any positive code still holds a channel.
    pub fn is_down(&self) -> bool {
        self.code() <= 0
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DownAvailable => "CHANNEL IS DOWN AND AVAILABLE",
            Self::DownReserved => "CHANNEL IS DOWN, BUT RESERVED",
            Self::OffHook => "CHANNEL IS OFF HOOK",
            Self::DigitsDialed => "DIGITS (OR EQUIVALENT) HAVE BEEN DIALED",
            Self::Ringing => "LINE IS RINGING",
            Self::RemoteRinging => "REMOTE END IS RINGING",
            Self::Up => "LINE IS UP",
            Self::Busy => "LINE IS BUSY",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Capability surface over the telephony control channel
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Call-start arguments
    fn env(&self) -> &AgiEnv;

    async fn answer(&self) -> Result<(), SessionError>;

    /// Play a sound file (path without extension)
    async fn stream_file(&self, path: &str) -> Result<(), SessionError>;

    /// Run a dialplan application, returning its result code
    async fn exec(&self, application: &str, args: &[&str]) -> Result<i32, SessionError>;

    /// Read a channel variable or function. `None` when unset.
    async fn get_variable(&self, name: &str) -> Result<Option<String>, SessionError>;

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), SessionError>;

    async fn channel_status(&self) -> Result<ChannelStatus, SessionError>;

    async fn hang_up(&self) -> Result<(), SessionError>;

    /// Write a line to the switch's log
    async fn log(&self, level: LogLevel, message: &str) -> Result<(), SessionError> {
        self.exec("Log", &[level.as_str(), message]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_status_codes() {
        for code in 0..=7 {
            assert_eq!(ChannelStatus::from_code(code).code(), code);
        }
        assert_eq!(ChannelStatus::from_code(9), ChannelStatus::Unknown(9));
        assert_eq!(ChannelStatus::from_code(6).description(), "LINE IS UP");
    }

    #[test]
    fn test_non_positive_status_counts_as_down() {
        assert!(ChannelStatus::DownAvailable.is_down());
        assert!(!ChannelStatus::DownReserved.is_down());
        assert!(!ChannelStatus::Up.is_down());
        assert!(ChannelStatus::Unknown(-1).is_down());
    }
}
