use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detect_chrome_executable;

/// Launch and tuning configuration for the CDP backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Deadline applied to every protocol command.
    pub command_deadline_ms: u64,
    /// Connect to an already-running browser instead of launching one.
    pub websocket_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: default_profile_dir(),
            headless: true,
            command_deadline_ms: 30_000,
            websocket_url: None,
        }
    }
}

fn default_profile_dir() -> PathBuf {
    std::env::temp_dir().join("toolgate-profile")
}
