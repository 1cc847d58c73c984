//! Call lifecycle controller.
//!
//! Drives one call through: report start → caller-id presentation → record →
//! bridge → classify → busy prompt → finalize → report end.
//!
//! Control operations are best-effort. A failure marks the line (see
//! [`LineState`]) and every later session-mutating step is skipped, while
//! finalize and the end event still run. Only errors from the unguarded
//! steps escape the body; they are converted once into a [`CallOutcome`].

use std::error::Error as StdError;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::adapters::{EventReporter, ReportReceipt, SessionControl, SessionError};
use crate::config::Config;
use crate::domain::session::{non_empty, ENV_USE_CASE};
use crate::domain::{CallArgs, CallSession, LineState, TransferState};

use super::call_logger::CallLogger;

/// Channel variable holding the SIP Call-ID, used as the call id
pub const CALL_ID_VARIABLE: &str = "SIPCALLID";

/// Channel variable `Dial()` leaves its outcome in
pub const DIAL_STATUS_VARIABLE: &str = "DIALSTATUS";

const CDR_START: &str = "CDR(start)";
const CDR_END: &str = "CDR(end)";

/// Asterisk CDR timestamp layout
const CDR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors escaping the lifecycle body
#[derive(Debug, Error)]
pub enum CallError {
    #[error("remote party hung up")]
    Hangup,

    #[error(transparent)]
    Session(SessionError),
}

impl From<SessionError> for CallError {
    fn from(error: SessionError) -> Self {
        if error.is_hangup() {
            Self::Hangup
        } else {
            Self::Session(error)
        }
    }
}

/// Status marker left for the dialplan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Hangup,
    Success,
    Failure,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hangup => "HANGUP",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Failure => 1,
            Self::Hangup | Self::Success => 0,
        }
    }
}

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: CompletionStatus,
    pub transfer_state: TransferState,
    pub line: LineState,
    pub call_id: String,
    pub use_case: String,
}

impl CallOutcome {
    /// Outcome for a call that ended before the session started
    fn unstarted(status: CompletionStatus, line: LineState, call_id: String, use_case: String) -> Self {
        Self {
            status,
            transfer_state: TransferState::Predial,
            line,
            call_id,
            use_case,
        }
    }
}

enum BridgeAttempt {
    Skipped,
    Dialed { dial_status: Option<String> },
}

/// The call state machine
pub struct CallController<R> {
    config: Config,
    reporter: R,
}

impl<R: EventReporter> CallController<R> {
    pub fn new(config: Config, reporter: R) -> Self {
        Self { config, reporter }
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Handle one call from validation through the end event
    #[instrument(skip_all)]
    pub async fn run(&self, session: &dyn SessionControl) -> CallOutcome {
        let use_case = non_empty(session.env(), ENV_USE_CASE).unwrap_or_default();

        let call_id = match session.get_variable(CALL_ID_VARIABLE).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) if e.is_hangup() => {
                debug!("Caller hung up before the call started");
                return CallOutcome::unstarted(
                    CompletionStatus::Hangup,
                    LineState::RemoteHangup,
                    String::new(),
                    use_case,
                );
            }
            Err(e) => {
                warn!(error = %e, "Could not read {}", CALL_ID_VARIABLE);
                return CallOutcome::unstarted(
                    CompletionStatus::Failure,
                    LineState::Live,
                    String::new(),
                    use_case,
                );
            }
        };

        let logger = CallLogger::new(session, call_id.clone(), use_case.clone());

        let args = match CallArgs::from_env(session.env(), &self.config.defaults) {
            Ok(args) => args,
            Err(e) => {
                logger.error(e.to_string()).await;
                return CallOutcome::unstarted(
                    CompletionStatus::Failure,
                    LineState::Live,
                    call_id,
                    use_case,
                );
            }
        };

        let mut call = CallSession::new(call_id, args);
        log_parameters(&logger, &call).await;

        self.report_start(session, &logger, &mut call).await;

        let body = self.drive(session, &logger, &mut call).await;
        let teardown = self.finalize(session, &logger, &mut call).await;
        let result = body.and(teardown);

        if matches!(result, Err(CallError::Hangup)) {
            call.mark_remote_hangup();
        }
        if !call.transfer_state().is_terminal() {
            call.conclude_transfer(TransferState::PredialFailure);
        }

        self.report_end(session, &logger, &mut call).await;

        let status = match result {
            Ok(()) if call.line() != LineState::RemoteHangup => CompletionStatus::Success,
            Ok(()) | Err(CallError::Hangup) => {
                logger.info("HUNGUP OCCURRED").await;
                CompletionStatus::Hangup
            }
            Err(CallError::Session(e)) => {
                logger.error(diagnostic_trace(&e)).await;
                CompletionStatus::Failure
            }
        };

        CallOutcome {
            status,
            transfer_state: call.transfer_state(),
            line: call.line(),
            call_id: call.call_id,
            use_case: call.args.use_case_name,
        }
    }

    /// Exit contract: status marker, final log line, hang up a live channel
    pub async fn conclude(&self, session: &dyn SessionControl, outcome: &CallOutcome) {
        let logger = CallLogger::new(session, outcome.call_id.clone(), outcome.use_case.clone());

        if let Err(e) = session
            .set_variable(&self.config.status_variable, outcome.status.as_str())
            .await
        {
            warn!(error = %e, "Could not set {}", self.config.status_variable);
        }

        logger.info("SCRIPT ENDED").await;

        if outcome.line == LineState::RemoteHangup {
            return;
        }

        match session.channel_status().await {
            Ok(status) if !status.is_down() => {
                if let Err(e) = session.hang_up().await {
                    warn!(error = %e, "Final hangup failed");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Channel already gone"),
        }
    }

    async fn report_start(
        &self,
        session: &dyn SessionControl,
        logger: &CallLogger<'_>,
        call: &mut CallSession,
    ) {
        let start_time = read_time(session, logger, call, CDR_START).await;
        call.start_time = Some(start_time.clone());

        let result = self
            .reporter
            .report_call_start(
                &call.call_id,
                &call.recording_name(),
                &self.config.server_ip,
                &call.args.reported_extension(),
                &start_time,
            )
            .await;
        log_report(logger, "ASTERISK_CALL_START", result).await;
    }

    async fn drive(
        &self,
        session: &dyn SessionControl,
        logger: &CallLogger<'_>,
        call: &mut CallSession,
    ) -> Result<(), CallError> {
        if call.is_live() {
            // Read by the voice application on the far side of the bridge
            let presented_name = format!("{}|{}", call.call_id, call.args.use_case_name);
            session.set_variable("CALLERID(name)", &presented_name).await?;
            session
                .set_variable("CALLERID(num)", &call.args.called_number)
                .await?;
        }

        self.start(session, logger, call).await;

        let dial_status = match self.bridge(session, logger, call).await {
            BridgeAttempt::Skipped => {
                logger.warn("Call already released, skipping dial").await;
                return Ok(());
            }
            BridgeAttempt::Dialed { dial_status } => dial_status,
        };

        let state = TransferState::classify(dial_status.as_deref());
        call.conclude_transfer(state);
        logger
            .info(format!(
                "DIALSTATUS=[{}] transfer_state=[{}]",
                dial_status.as_deref().unwrap_or_default(),
                state
            ))
            .await;

        self.react(session, logger, call).await;
        Ok(())
    }

    /// Start the per-leg and the mixed recording
    async fn start(&self, session: &dyn SessionControl, logger: &CallLogger<'_>, call: &mut CallSession) {
        if !call.is_live() {
            return;
        }

        let recording = call.recording_name();
        let result = async {
            session.exec("Monitor", &["wav", call.call_id.as_str()]).await?;
            session.exec("MixMonitor", &[recording.as_str()]).await?;
            Ok::<_, SessionError>(())
        }
        .await;

        if let Err(e) = result {
            contain(logger, call, "Recording start", e).await;
        }
    }

    async fn bridge(
        &self,
        session: &dyn SessionControl,
        logger: &CallLogger<'_>,
        call: &mut CallSession,
    ) -> BridgeAttempt {
        if !call.is_live() {
            return BridgeAttempt::Skipped;
        }

        let dial = &self.config.dial;
        let header = format!("{}:{}", dial.autoscaling_header, call.args.autoscaling_group);
        let target = format!(
            "{}/{}@{}",
            dial.technology, call.args.target_extension, call.args.peer_name
        );
        let timeout = dial.ring_timeout_seconds.to_string();

        logger
            .info(format!("Dialing {} (ring timeout {}s)", target, timeout))
            .await;

        let result = async {
            session.exec("SIPAddHeader", &[header.as_str()]).await?;
            session
                .exec("Dial", &[target.as_str(), timeout.as_str()])
                .await?;
            Ok::<_, SessionError>(())
        }
        .await;

        if let Err(e) = result {
            contain(logger, call, "Dial", e).await;
        }

        let dial_status = match session.get_variable(DIAL_STATUS_VARIABLE).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_hangup() {
                    call.mark_remote_hangup();
                }
                logger
                    .warn(format!("Could not read {}: {}", DIAL_STATUS_VARIABLE, e))
                    .await;
                None
            }
        };

        BridgeAttempt::Dialed { dial_status }
    }

    /// Play the busy prompt for any outcome other than success
    async fn react(&self, session: &dyn SessionControl, logger: &CallLogger<'_>, call: &mut CallSession) {
        let state = call.transfer_state();
        if !state.plays_busy_prompt() {
            return;
        }
        if !call.is_live() {
            logger
                .info(format!("Call released, no busy prompt for {}", state))
                .await;
            return;
        }

        logger.info(format!("Playing busy prompt for {}", state)).await;

        // ANSWER is a no-op on an already answered channel
        let result = async {
            session.answer().await?;
            session.stream_file(&self.config.busy_audio_file).await
        }
        .await;

        if let Err(e) = result {
            contain(logger, call, "Busy prompt", e).await;
        }
    }

    /// Stop recording; hang up a live channel that is not already down
    async fn finalize(
        &self,
        session: &dyn SessionControl,
        logger: &CallLogger<'_>,
        call: &mut CallSession,
    ) -> Result<(), CallError> {
        if let Err(e) = session.exec("StopMixMonitor", &[]).await {
            if e.is_hangup() {
                call.mark_remote_hangup();
            }
            logger.warn(format!("StopMixMonitor failed: {}", e)).await;
        }

        if !call.is_live() {
            return Ok(());
        }

        let status = session.channel_status().await?;
        logger
            .info(format!("CALL STATUS: {}", status.description()))
            .await;

        if !status.is_down() {
            session.hang_up().await?;
        }
        Ok(())
    }

    async fn report_end(
        &self,
        session: &dyn SessionControl,
        logger: &CallLogger<'_>,
        call: &mut CallSession,
    ) {
        let end_time = read_time(session, logger, call, CDR_END).await;
        call.end_time = Some(end_time.clone());

        let result = self
            .reporter
            .report_call_end(&call.call_id, call.transfer_state(), &end_time)
            .await;
        log_report(logger, "ASTERISK_CALL_END", result).await;
    }
}

/// Mark the line after a failed control operation
async fn contain(logger: &CallLogger<'_>, call: &mut CallSession, step: &str, error: SessionError) {
    if error.is_hangup() {
        call.mark_remote_hangup();
    } else {
        call.mark_control_failed();
    }
    logger
        .warn(format!("{} failed, releasing call: {}", step, error))
        .await;
}

/// Read a CDR timestamp, falling back to the current time
async fn read_time(
    session: &dyn SessionControl,
    logger: &CallLogger<'_>,
    call: &mut CallSession,
    variable: &str,
) -> String {
    match session.get_variable(variable).await {
        Ok(Some(value)) if !value.trim().is_empty() => return value,
        Ok(_) => {}
        Err(e) => {
            if e.is_hangup() {
                call.mark_remote_hangup();
            }
            logger
                .warn(format!("Could not read {}: {}", variable, e))
                .await;
        }
    }
    Utc::now().format(CDR_TIME_FORMAT).to_string()
}

async fn log_parameters(logger: &CallLogger<'_>, call: &CallSession) {
    let args = &call.args;
    let parameters = [
        ("called_number", args.called_number.as_str()),
        ("target_extension", args.target_extension.as_str()),
        ("use_case_name", args.use_case_name.as_str()),
        ("autoscaling_group", args.autoscaling_group.as_str()),
        ("peer_name", args.peer_name.as_str()),
        ("caller_id", args.caller_id.as_deref().unwrap_or_default()),
        ("unique_id", args.unique_id.as_deref().unwrap_or_default()),
    ];

    for (name, value) in parameters {
        logger.info(format!("{}=[{}]", name, value)).await;
    }
}

async fn log_report(logger: &CallLogger<'_>, event_type: &str, result: anyhow::Result<ReportReceipt>) {
    match result {
        Ok(receipt) if receipt.is_success() => {
            logger
                .info(format!("{} sent (HTTP {})", event_type, receipt.status))
                .await
        }
        Ok(receipt) => {
            logger
                .warn(format!(
                    "{} rejected (HTTP {}): {}",
                    event_type, receipt.status, receipt.body
                ))
                .await
        }
        Err(e) => logger.error(format!("{} not sent: {:#}", event_type, e)).await,
    }
}

/// Error and its sources as log fragments
fn diagnostic_trace(error: &SessionError) -> Vec<String> {
    let mut fragments = vec!["unhandled error:".to_string(), error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        fragments.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    fragments
}
