//! Configuration for callbridge.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ASTERISK_SERVER_IP, CALLBRIDGE_SINK_URL, CALLBRIDGE_BUSY_AUDIO)
//! 2. Config file (YAML)
//! 3. Defaults
//!
//! Config file discovery:
//! - `--config <path>` or CALLBRIDGE_CONFIG
//! - callbridge.yaml next to the executable (where the dialplan points AGI)
//! - .callbridge/config.yaml in the current directory or its parents
//! - ~/.callbridge/config.yaml for the user Asterisk runs as
//!
//! The resolved [`Config`] is built once at process start and handed to the
//! controller and the event reporter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::RoutingDefaults;

pub const ENV_SERVER_IP: &str = "ASTERISK_SERVER_IP";
pub const ENV_SINK_URL: &str = "CALLBRIDGE_SINK_URL";
pub const ENV_BUSY_AUDIO: &str = "CALLBRIDGE_BUSY_AUDIO";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Address of this Asterisk server, reported in CALL_START
    pub server_ip: Option<String>,
    #[serde(default)]
    pub event_sink: EventSinkConfig,
    /// Sound file played when the bridge does not succeed
    pub busy_audio_file: Option<String>,
    #[serde(default)]
    pub dial: DialSettings,
    #[serde(default)]
    pub defaults: RoutingDefaults,
    pub status_variable: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSinkConfig {
    pub url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// How the bridge to the peer is dialed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialSettings {
    /// Channel technology prefix (default: SIP)
    #[serde(default = "default_technology")]
    pub technology: String,

    /// Ring timeout in seconds (default: 15)
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_seconds: u64,

    /// SIP header carrying the autoscaling group
    #[serde(default = "default_autoscaling_header")]
    pub autoscaling_header: String,
}

fn default_technology() -> String {
    "SIP".to_string()
}
fn default_ring_timeout() -> u64 {
    15
}
fn default_autoscaling_header() -> String {
    "X-Autoscaling-Group".to_string()
}
fn default_status_variable() -> String {
    "CALLBRIDGE_STATUS".to_string()
}
fn default_sink_timeout() -> u64 {
    5
}

impl Default for DialSettings {
    fn default() -> Self {
        Self {
            technology: default_technology(),
            ring_timeout_seconds: default_ring_timeout(),
            autoscaling_header: default_autoscaling_header(),
        }
    }
}

/// Where call events are posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSinkSettings {
    pub url: String,
    pub timeout: Duration,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_ip: String,
    pub event_sink: EventSinkSettings,
    pub busy_audio_file: String,
    pub dial: DialSettings,
    pub defaults: RoutingDefaults,
    /// Channel variable receiving HANGUP / SUCCESS / FAILURE on exit
    pub status_variable: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Search for a config file when none was given explicitly
fn find_config_file() -> Option<PathBuf> {
    if let Some(beside_exe) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("callbridge.yaml")))
    {
        if beside_exe.exists() {
            return Some(beside_exe);
        }
    }

    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(".callbridge").join("config.yaml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    dirs::home_dir()
        .map(|home| home.join(".callbridge").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge file values, environment overrides and defaults
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let server_ip = env(ENV_SERVER_IP)
        .or(file.server_ip)
        .with_context(|| format!("server_ip is not configured (config file or {ENV_SERVER_IP})"))?;

    let url = env(ENV_SINK_URL)
        .or(file.event_sink.url)
        .with_context(|| format!("event_sink.url is not configured (config file or {ENV_SINK_URL})"))?;

    let busy_audio_file = env(ENV_BUSY_AUDIO)
        .or(file.busy_audio_file)
        .with_context(|| {
            format!("busy_audio_file is not configured (config file or {ENV_BUSY_AUDIO})")
        })?;

    Ok(Config {
        server_ip,
        event_sink: EventSinkSettings {
            url,
            timeout: Duration::from_secs(
                file.event_sink
                    .timeout_seconds
                    .unwrap_or_else(default_sink_timeout),
            ),
        },
        busy_audio_file,
        dial: file.dial,
        defaults: file.defaults,
        status_variable: file
            .status_variable
            .unwrap_or_else(default_status_variable),
        config_file,
    })
}

/// Load configuration from all sources
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let config_file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(file, config_file, |key| {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    })
}
