//! Core call handling.
//!
//! This module contains:
//! - CallLogger: prefixed per-call logging
//! - CallController: the call lifecycle state machine

pub mod call_logger;
pub mod controller;

// Re-export commonly used types
pub use call_logger::{format_prefixed, CallLogger, LogMessage};
pub use controller::{CallController, CallError, CallOutcome, CompletionStatus};
