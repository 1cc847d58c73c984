//! Per-call session state.
//!
//! A CallSession lives for exactly one AGI invocation. Identifying fields are
//! fixed at construction; only the line state and transfer state move, and
//! both only move forward.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transfer::TransferState;

/// AGI environment keys carrying the call setup
pub const ENV_CALLED_NUMBER: &str = "agi_dnid";
pub const ENV_CALLER_ID: &str = "agi_callerid";
pub const ENV_UNIQUE_ID: &str = "agi_uniqueid";
pub const ENV_TARGET_EXTENSION: &str = "agi_arg_1";
pub const ENV_USE_CASE: &str = "agi_arg_2";
pub const ENV_AUTOSCALING_GROUP: &str = "agi_arg_3";
pub const ENV_PEER_NAME: &str = "agi_arg_4";

/// Fallbacks for the optional routing arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDefaults {
    #[serde(default = "default_autoscaling_group")]
    pub autoscaling_group: String,

    #[serde(default = "default_peer_name")]
    pub peer_name: String,
}

fn default_autoscaling_group() -> String {
    "autoscale".to_string()
}

fn default_peer_name() -> String {
    "OPENSIPS".to_string()
}

impl Default for RoutingDefaults {
    fn default() -> Self {
        Self {
            autoscaling_group: default_autoscaling_group(),
            peer_name: default_peer_name(),
        }
    }
}

/// Missing call-setup arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Could not get called number (agi_dnid)")]
    MissingCalledNumber,

    #[error("Missing target extension (agi_arg_1); both extension and use case name are required")]
    MissingTargetExtension,

    #[error("Missing use case name (agi_arg_2); both extension and use case name are required")]
    MissingUseCase,
}

/// Validated call-setup arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArgs {
    pub called_number: String,
    pub caller_id: Option<String>,
    pub unique_id: Option<String>,
    pub target_extension: String,
    pub use_case_name: String,
    pub autoscaling_group: String,
    pub peer_name: String,
}

impl CallArgs {
    /// Validate the AGI environment, filling optional routing arguments from `defaults`.
    pub fn from_env(
        env: &HashMap<String, String>,
        defaults: &RoutingDefaults,
    ) -> Result<Self, ValidationError> {
        let called_number =
            non_empty(env, ENV_CALLED_NUMBER).ok_or(ValidationError::MissingCalledNumber)?;
        let target_extension =
            non_empty(env, ENV_TARGET_EXTENSION).ok_or(ValidationError::MissingTargetExtension)?;
        let use_case_name = non_empty(env, ENV_USE_CASE).ok_or(ValidationError::MissingUseCase)?;

        Ok(Self {
            called_number,
            caller_id: non_empty(env, ENV_CALLER_ID),
            unique_id: non_empty(env, ENV_UNIQUE_ID),
            target_extension,
            use_case_name,
            autoscaling_group: non_empty(env, ENV_AUTOSCALING_GROUP)
                .unwrap_or_else(|| defaults.autoscaling_group.clone()),
            peer_name: non_empty(env, ENV_PEER_NAME).unwrap_or_else(|| defaults.peer_name.clone()),
        })
    }

    /// Extension reported to the event sink: the first four characters of the called number
    pub fn reported_extension(&self) -> String {
        self.called_number.chars().take(4).collect()
    }
}

/// Look up an environment value, treating blank values as absent
pub fn non_empty(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Whether control operations may still be issued on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineState {
    /// No failure seen yet
    #[default]
    Live,

    /// A control operation failed
    ControlFailed,

    /// The remote party disconnected
    RemoteHangup,
}

impl LineState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// State of one call, owned by the controller
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: String,
    pub args: CallArgs,
    line: LineState,
    transfer_state: TransferState,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl CallSession {
    pub fn new(call_id: String, args: CallArgs) -> Self {
        Self {
            call_id,
            args,
            line: LineState::Live,
            transfer_state: TransferState::Predial,
            start_time: None,
            end_time: None,
        }
    }

    pub fn line(&self) -> LineState {
        self.line
    }

    pub fn is_live(&self) -> bool {
        self.line.is_live()
    }

    /// The sticky hangup flag
    pub fn user_hangup(&self) -> bool {
        !self.line.is_live()
    }

    /// Record a failed control operation. No effect once the line has left `Live`.
    pub fn mark_control_failed(&mut self) {
        if self.line.is_live() {
            self.line = LineState::ControlFailed;
        }
    }

    /// Record a remote disconnect. Overrides a control failure, since the
    /// channel is known to be gone.
    pub fn mark_remote_hangup(&mut self) {
        self.line = LineState::RemoteHangup;
    }

    pub fn transfer_state(&self) -> TransferState {
        self.transfer_state
    }

    /// Move to a terminal state. Returns false (and keeps the current state)
    /// if a terminal state was already reached.
    pub fn conclude_transfer(&mut self, state: TransferState) -> bool {
        if self.transfer_state.is_terminal() {
            return false;
        }
        self.transfer_state = state;
        true
    }

    /// File name shared by both recordings of this call
    pub fn recording_name(&self) -> String {
        format!("{}.wav", self.call_id)
    }
}
