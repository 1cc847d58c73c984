//! Shared test doubles for the controller tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use callbridge::adapters::{
    AgiEnv, ChannelStatus, EventReporter, LogLevel, ReportReceipt, SessionControl, SessionError,
};
use callbridge::config::{Config, DialSettings, EventSinkSettings};
use callbridge::domain::{EventEnvelope, RoutingDefaults};

pub const CALL_ID: &str = "call-abc@10.0.0.1";
pub const BUSY_AUDIO: &str = "/sounds/busy";

pub fn test_config() -> Config {
    Config {
        server_ip: "10.0.0.5".to_string(),
        event_sink: EventSinkSettings {
            url: "http://sink.invalid/events".to_string(),
            timeout: Duration::from_secs(1),
        },
        busy_audio_file: BUSY_AUDIO.to_string(),
        dial: DialSettings::default(),
        defaults: RoutingDefaults::default(),
        status_variable: "CALLBRIDGE_STATUS".to_string(),
        config_file: None,
    }
}

/// How an injected failure surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Command,
    Hangup,
}

/// Scripted telephony session recording every control operation
pub struct MockSession {
    env: AgiEnv,
    variables: Mutex<HashMap<String, String>>,
    failures: HashMap<String, Failure>,
    dial_outcome: Option<String>,
    status: Mutex<ChannelStatus>,
    calls: Mutex<Vec<String>>,
    logs: Mutex<Vec<(LogLevel, String)>>,
}

impl MockSession {
    /// A valid call for extension 7709 / use case "demo"
    pub fn new() -> Self {
        let env = [
            ("agi_request", "callbridge"),
            ("agi_dnid", "12345678abcd"),
            ("agi_callerid", "5551234"),
            ("agi_uniqueid", "1700000000.1"),
            ("agi_arg_1", "7709"),
            ("agi_arg_2", "demo"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let variables = [
            ("SIPCALLID", CALL_ID),
            ("CDR(start)", "2026-10-14 10:00:00"),
            ("CDR(end)", "2026-10-14 10:05:00"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            env,
            variables: Mutex::new(variables),
            failures: HashMap::new(),
            dial_outcome: None,
            status: Mutex::new(ChannelStatus::Up),
            calls: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_env(mut self, key: &str) -> Self {
        self.env.remove(key);
        self
    }

    /// DIALSTATUS left behind by a successful Dial
    pub fn dial_outcome(mut self, outcome: &str) -> Self {
        self.dial_outcome = Some(outcome.to_string());
        self
    }

    /// Fail an operation: an application name ("Dial") or a command ("ANSWER")
    pub fn fail_on(mut self, operation: &str, failure: Failure) -> Self {
        self.failures.insert(operation.to_string(), failure);
        self
    }

    pub fn with_status(self, status: ChannelStatus) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    /// Control operations in issue order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn logs(&self) -> Vec<(LogLevel, String)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.lock().unwrap().get(name).cloned()
    }

    fn record(&self, operation: &str, call: String) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.get(operation) {
            Some(Failure::Command) => Err(SessionError::CommandFailed {
                command: operation.to_string(),
                reason: "injected".to_string(),
            }),
            Some(Failure::Hangup) => {
                *self.status.lock().unwrap() = ChannelStatus::DownAvailable;
                Err(SessionError::Hangup)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionControl for MockSession {
    fn env(&self) -> &AgiEnv {
        &self.env
    }

    async fn answer(&self) -> Result<(), SessionError> {
        self.record("ANSWER", "ANSWER".to_string())
    }

    async fn stream_file(&self, path: &str) -> Result<(), SessionError> {
        self.record("STREAM FILE", format!("STREAM FILE {}", path))
    }

    async fn exec(&self, application: &str, args: &[&str]) -> Result<i32, SessionError> {
        self.record(application, format!("EXEC {} {}", application, args.join(",")))?;
        if application == "Dial" {
            if let Some(outcome) = &self.dial_outcome {
                self.variables
                    .lock()
                    .unwrap()
                    .insert("DIALSTATUS".to_string(), outcome.clone());
            }
        }
        Ok(0)
    }

    async fn get_variable(&self, name: &str) -> Result<Option<String>, SessionError> {
        if let Some(failure) = self.failures.get(&format!("GET {}", name)) {
            return Err(match failure {
                Failure::Command => SessionError::UnexpectedReply("injected".to_string()),
                Failure::Hangup => SessionError::Hangup,
            });
        }
        Ok(self.variables.lock().unwrap().get(name).cloned())
    }

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), SessionError> {
        self.record("SET VARIABLE", format!("SET VARIABLE {}={}", name, value))?;
        self.variables
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn channel_status(&self) -> Result<ChannelStatus, SessionError> {
        self.record("CHANNEL STATUS", "CHANNEL STATUS".to_string())?;
        Ok(*self.status.lock().unwrap())
    }

    async fn hang_up(&self) -> Result<(), SessionError> {
        self.record("HANGUP", "HANGUP".to_string())?;
        *self.status.lock().unwrap() = ChannelStatus::DownAvailable;
        Ok(())
    }

    async fn log(&self, level: LogLevel, message: &str) -> Result<(), SessionError> {
        self.logs.lock().unwrap().push((level, message.to_string()));
        Ok(())
    }
}

/// Event reporter that keeps every envelope it is handed
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<EventEnvelope>>,
    status: Option<u16>,
    unreachable: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every event with this HTTP status
    pub fn responding(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Fail every event as a transport error
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl EventReporter for RecordingReporter {
    async fn report(&self, envelope: &EventEnvelope) -> Result<ReportReceipt> {
        self.events.lock().unwrap().push(envelope.clone());
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        Ok(ReportReceipt {
            status: self.status.unwrap_or(200),
            body: String::new(),
        })
    }
}
