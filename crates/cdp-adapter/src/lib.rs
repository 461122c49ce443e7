//! Automation engine backends.
//!
//! The gateway never talks wire protocol itself: it drives the
//! [`AutomationEngine`] trait. This crate ships two implementations: a
//! Chromium DevTools Protocol backend for real browsers and a scripted
//! in-memory engine for tests and protocol development.

pub mod cdp;
pub mod config;
pub mod errors;
pub mod events;
pub mod ports;
pub mod scripted;
pub mod transport;
mod util;

use std::path::PathBuf;

use which::which;

pub use cdp::CdpEngine;
pub use config::EngineConfig;
pub use errors::{EngineError, EngineErrorKind};
pub use events::EngineEvent;
pub use ports::{
    AutomationEngine, ClickOptions, EngineSession, MouseButton, PageInfo, SessionSpec, TypeOptions,
};
pub use scripted::ScriptedEngine;

/// Locate a usable Chromium/Chrome executable on this host.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TOOLGATE_CHROME") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    const CANDIDATES: &[&str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];
    for candidate in CANDIDATES {
        if let Ok(path) = which(candidate) {
            return Some(path);
        }
    }

    const KNOWN_PATHS: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}
