//! Per-call logger.
//!
//! Every line is prefixed with the caller identity and the use case, written
//! to the Asterisk log through the session, and mirrored to `tracing`.
//! Logging never fails the call: forwarding errors are dropped.

use tracing::{debug, error, info, warn};

use crate::adapters::{LogLevel, SessionControl};

/// Written instead of a message that has no printable content
pub const UNKNOWN_ERROR_LINE: &str = "UNKNOWN ERROR in callbridge";

/// A log message: one text, or fragments joined with spaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMessage {
    Text(String),
    Fragments(Vec<String>),
}

impl LogMessage {
    /// Render to a single line. `None` if there is nothing to print.
    fn render(self) -> Option<String> {
        let text = match self {
            Self::Text(text) => text,
            Self::Fragments(parts) => parts
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl From<&str> for LogMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for LogMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for LogMessage {
    fn from(parts: Vec<String>) -> Self {
        Self::Fragments(parts)
    }
}

/// `CALLERID(name:<caller>|<use case>) <message>`
pub fn format_prefixed(caller_id: &str, use_case: &str, message: &str) -> String {
    format!("CALLERID(name:{}|{}) {}", caller_id, use_case, message)
}

/// Logger bound to one call
pub struct CallLogger<'a> {
    session: &'a dyn SessionControl,
    caller_id: String,
    use_case: String,
}

impl<'a> CallLogger<'a> {
    pub fn new(
        session: &'a dyn SessionControl,
        caller_id: impl Into<String>,
        use_case: impl Into<String>,
    ) -> Self {
        Self {
            session,
            caller_id: caller_id.into(),
            use_case: use_case.into(),
        }
    }

    pub async fn info(&self, message: impl Into<LogMessage>) {
        self.log(LogLevel::Notice, message).await
    }

    pub async fn warn(&self, message: impl Into<LogMessage>) {
        self.log(LogLevel::Warning, message).await
    }

    pub async fn error(&self, message: impl Into<LogMessage>) {
        self.log(LogLevel::Error, message).await
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<LogMessage>) {
        let (level, text) = match message.into().render() {
            Some(text) => (level, text),
            None => (LogLevel::Error, UNKNOWN_ERROR_LINE.to_string()),
        };

        self.mirror(level, &text);

        let line = format_prefixed(&self.caller_id, &self.use_case, &text);
        if let Err(e) = self.session.log(level, &line).await {
            debug!(error = %e, "Dropping Asterisk log line");
        }
    }

    fn mirror(&self, level: LogLevel, text: &str) {
        let (caller_id, use_case) = (self.caller_id.as_str(), self.use_case.as_str());
        match level {
            LogLevel::Error => error!(call_id = caller_id, use_case, "{}", text),
            LogLevel::Warning => warn!(call_id = caller_id, use_case, "{}", text),
            LogLevel::Notice | LogLevel::Verbose => info!(call_id = caller_id, use_case, "{}", text),
            LogLevel::Debug | LogLevel::Dtmf => debug!(call_id = caller_id, use_case, "{}", text),
        }
    }
}
