//! callbridge - Asterisk AGI call handler
//!
//! Invoked by the dialplan once per inbound call. It records the call,
//! bridges it to a voice-application peer, plays a busy prompt when the
//! bridge fails, tears the call down and reports start/end events to an
//! HTTP logging sink.
//!
//! # Architecture
//!
//! The call is a small state machine:
//! - Control-operation failures set a sticky line state instead of aborting
//! - Finalize and the end event run on every path
//! - The controller returns an outcome; only `main` exits the process
//!
//! # Modules
//!
//! - `adapters`: External system integrations (AGI channel, event sink)
//! - `core`: Call lifecycle controller and per-call logger
//! - `domain`: Data structures (CallSession, TransferState, events)
//! - `config`: Configuration resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```text
//! exten => 12,1,Set(AGISIGHUP=no)
//! exten => 12,2,AGI(/usr/local/bin/callbridge,7709,development,autoscale,OPENSIPS)
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{AgiSession, EventReporter, HttpEventReporter, SessionControl, SessionError};
pub use config::Config;
pub use self::core::{CallController, CallOutcome, CompletionStatus};
pub use domain::{CallSession, EventEnvelope, LineState, TransferState};
