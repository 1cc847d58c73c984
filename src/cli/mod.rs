//! Command-line interface for callbridge.
//!
//! The dialplan runs `AGI(callbridge,<extension>,<use case>[,<group>[,<peer>]])`.
//! Asterisk passes the same arguments on the command line and as `agi_arg_N`
//! in the AGI environment; the environment wins.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::adapters::{AgiSession, HttpEventReporter};
use crate::config::{self, Config};
use crate::core::CallController;

/// callbridge - record, bridge and report one inbound call
#[derive(Parser, Debug)]
#[command(name = "callbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (searched next to the executable and in .callbridge/ otherwise)
    #[arg(short, long, env = "CALLBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit without touching a call
    #[arg(long)]
    pub check_config: bool,

    /// Call-setup arguments: extension, use case, autoscaling group, peer
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub agi_args: Vec<String>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        let config = config::load(self.config.as_deref())
            .inspect_err(|e| bootstrap_failed("config", e))?;

        if self.check_config {
            show_config(&config);
            return Ok(ExitCode::SUCCESS);
        }

        let mut session = AgiSession::from_stdio()
            .await
            .context("Failed to read AGI environment")
            .inspect_err(|e| bootstrap_failed("agi_env", e))?;
        session.fill_missing_args(&self.agi_args);

        let reporter = HttpEventReporter::from_config(&config.event_sink)
            .inspect_err(|e| bootstrap_failed("event_sink", e))?;
        let controller = CallController::new(config, reporter);

        let outcome = controller.run(&session).await;
        controller.conclude(&session, &outcome).await;

        info!(
            status = outcome.status.as_str(),
            transfer_state = %outcome.transfer_state,
            call_id = %outcome.call_id,
            "Call handled"
        );

        Ok(ExitCode::from(outcome.status.exit_code()))
    }
}

/// Operator hint on stderr; the call never started, so no status marker is set
fn bootstrap_failed(step: &str, error: &anyhow::Error) {
    warn!(step, error = %format!("{:#}", error), "Bootstrap failed");
}

/// Show resolved configuration. Never runs under AGI, so stdout is free.
fn show_config(config: &Config) {
    println!("callbridge configuration");
    println!("========================");
    match &config.config_file {
        Some(path) => println!("Config file:      {}", path.display()),
        None => println!("Config file:      (none, environment only)"),
    }
    println!("Server IP:        {}", config.server_ip);
    println!("Event sink:       {}", config.event_sink.url);
    println!("Sink timeout:     {}s", config.event_sink.timeout.as_secs());
    println!("Busy prompt:      {}", config.busy_audio_file);
    println!(
        "Dial:             {}/<ext>@<peer>, {}s ring timeout, header {}",
        config.dial.technology, config.dial.ring_timeout_seconds, config.dial.autoscaling_header
    );
    println!(
        "Defaults:         group={} peer={}",
        config.defaults.autoscaling_group, config.defaults.peer_name
    );
    println!("Status variable:  {}", config.status_variable);
}
