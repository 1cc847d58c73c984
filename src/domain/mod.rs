//! Domain types for callbridge.
//!
//! This module contains the core data structures:
//! - Session: per-call arguments and sticky line state
//! - Transfer: dial outcome classification
//! - Events: payloads sent to the logging sink

pub mod events;
pub mod session;
pub mod transfer;

// Re-export commonly used types
pub use events::{CallEvent, EventEnvelope, API_VERSION};
pub use session::{CallArgs, CallSession, LineState, RoutingDefaults, ValidationError};
pub use transfer::TransferState;
