//! The collaborator interface every engine backend implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use toolgate_core_types::{AxNode, NodeId, TabId};

use crate::errors::EngineError;
use crate::events::EngineEvent;

/// What kind of browser context a session should get.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Named profile to persist state under; anonymous context otherwise.
    pub profile: Option<String>,
}

/// Engine-side identity of a session (a browser context for CDP).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EngineSession(pub String);

/// Engine view of one open tab.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageInfo {
    pub tab: TabId,
    pub url: String,
    pub title: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: u32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypeOptions {
    /// Clear the field before typing.
    pub clear: bool,
    /// Press Enter after typing.
    pub submit: bool,
}

/// Browser-automation primitives consumed by the gateway.
///
/// Implementations own all wire-protocol detail; callers never see raw
/// element handles other than [`NodeId`]s scoped by the snapshot resolver.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    async fn create_session(&self, spec: &SessionSpec) -> Result<EngineSession, EngineError>;

    /// Tear down the session's context. Safe to call on an unknown session.
    async fn close_session(&self, session: &EngineSession) -> Result<(), EngineError>;

    async fn navigate(
        &self,
        session: &EngineSession,
        tab: &TabId,
        url: &str,
    ) -> Result<PageInfo, EngineError>;

    async fn click(
        &self,
        session: &EngineSession,
        tab: &TabId,
        node: NodeId,
        opts: &ClickOptions,
    ) -> Result<(), EngineError>;

    async fn type_text(
        &self,
        session: &EngineSession,
        tab: &TabId,
        node: NodeId,
        text: &str,
        opts: &TypeOptions,
    ) -> Result<(), EngineError>;

    async fn evaluate(
        &self,
        session: &EngineSession,
        tab: &TabId,
        expression: &str,
        node: Option<NodeId>,
    ) -> Result<Value, EngineError>;

    /// Capture the structural tree of the tab's current page.
    async fn snapshot(&self, session: &EngineSession, tab: &TabId) -> Result<AxNode, EngineError>;

    async fn list_windows(&self, session: &EngineSession) -> Result<Vec<PageInfo>, EngineError>;

    async fn open_window(
        &self,
        session: &EngineSession,
        url: Option<&str>,
    ) -> Result<PageInfo, EngineError>;

    async fn close_window(&self, session: &EngineSession, tab: &TabId) -> Result<(), EngineError>;

    async fn activate_window(&self, session: &EngineSession, tab: &TabId)
        -> Result<(), EngineError>;

    /// Subscribe to the raw event stream (network, console, dialogs).
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
