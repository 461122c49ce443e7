//! Layered configuration: built-in defaults, an optional config file and
//! `TOOLGATE_*` environment overrides, in that order.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use toolgate_scheduler::AdmissionConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8423".parse().expect("static addr"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSection {
    pub max_concurrent: usize,
    pub queue_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            queue_timeout_ms: 30_000,
            call_timeout_ms: 45_000,
        }
    }
}

impl AdmissionSection {
    pub fn gate_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_concurrent: self.max_concurrent,
            queue_timeout: (self.queue_timeout_ms > 0)
                .then(|| Duration::from_millis(self.queue_timeout_ms)),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }
}

/// Which engine backend to drive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Chromium,
    /// In-memory engine; no browser is launched.
    Scripted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub kind: EngineKind,
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub command_deadline_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            kind: EngineKind::Chromium,
            headless: true,
            executable: None,
            user_data_dir: None,
            command_deadline_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub max_events: usize,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self { max_events: 4096 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Emit JSON lines instead of the human format.
    pub json: bool,
    /// Also append logs to a daily file under this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            json: false,
            directory: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub admission: AdmissionSection,
    pub engine: EngineSection,
    pub capture: CaptureSection,
    pub log: LogSection,
}

impl GatewayConfig {
    /// Load configuration, layering `path` (or the per-user default file,
    /// when present) and the environment over the defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path.clone()));
            }
            None => {
                if let Some(default_path) = default_config_file() {
                    if default_path.exists() {
                        builder = builder.add_source(File::from(default_path));
                    }
                }
            }
        }

        let settings = builder
            .add_source(Environment::with_prefix("TOOLGATE").separator("__"))
            .build()
            .context("failed to assemble configuration")?;

        settings
            .try_deserialize()
            .context("failed to deserialize configuration")
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("toolgate").join("config.toml"))
}
