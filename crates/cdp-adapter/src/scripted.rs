//! In-memory engine double.
//!
//! Runs the full gateway stack without a browser: tabs are plain records,
//! snapshots come from scripted page trees, and every operation can carry
//! an artificial latency so admission and drain behaviour stay observable
//! in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use toolgate_core_types::{AxNode, NodeId, TabId};

use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::ports::{
    AutomationEngine, ClickOptions, EngineSession, PageInfo, SessionSpec, TypeOptions,
};

const EVENT_BUFFER: usize = 512;

#[derive(Default)]
struct ScriptedSession {
    tabs: Vec<PageInfo>,
}

/// Record of one interaction performed against the scripted engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptedCall {
    Navigate { tab: TabId, url: String },
    Click { node: NodeId },
    Type { node: NodeId, text: String },
    Evaluate { expression: String },
}

pub struct ScriptedEngine {
    sessions: DashMap<String, Arc<Mutex<ScriptedSession>>>,
    pages: Mutex<HashMap<String, AxNode>>,
    eval_results: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<ScriptedCall>>,
    latency: Mutex<Duration>,
    events: broadcast::Sender<EngineEvent>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sessions: DashMap::new(),
            pages: Mutex::new(HashMap::new()),
            eval_results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            events,
        }
    }

    /// Script the structural tree returned for snapshots of `url`.
    pub fn with_page(self, url: &str, tree: AxNode) -> Self {
        self.pages.lock().insert(url.to_string(), tree);
        self
    }

    /// Script the value returned when `expression` is evaluated.
    pub fn with_eval_result(self, expression: &str, result: Value) -> Self {
        self.eval_results.lock().insert(expression.to_string(), result);
        self
    }

    /// Apply an artificial delay to every operation.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Interactions performed so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Push a synthetic event into the stream, as a page would.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    async fn pause(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn session(&self, session: &EngineSession) -> Result<Arc<Mutex<ScriptedSession>>, EngineError> {
        self.sessions
            .get(&session.0)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::target_not_found(format!("session {}", session.0)))
    }

    fn default_tree() -> AxNode {
        AxNode::new(NodeId(1), "RootWebArea").with_children(vec![
            AxNode::new(NodeId(2), "button").with_name("Go").interactable(),
            AxNode::new(NodeId(3), "textbox").with_name("Query").interactable(),
            AxNode::new(NodeId(4), "paragraph").with_name("Scripted page"),
        ])
    }

    fn title_for(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    }
}

#[async_trait]
impl AutomationEngine for ScriptedEngine {
    async fn create_session(&self, _spec: &SessionSpec) -> Result<EngineSession, EngineError> {
        self.pause().await;
        let session = EngineSession(uuid::Uuid::new_v4().to_string());
        self.sessions
            .insert(session.0.clone(), Arc::new(Mutex::new(ScriptedSession::default())));
        Ok(session)
    }

    async fn close_session(&self, session: &EngineSession) -> Result<(), EngineError> {
        self.pause().await;
        self.sessions.remove(&session.0);
        Ok(())
    }

    async fn navigate(
        &self,
        session: &EngineSession,
        tab: &TabId,
        url: &str,
    ) -> Result<PageInfo, EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let mut guard = state.lock();
        let entry = guard
            .tabs
            .iter_mut()
            .find(|info| &info.tab == tab)
            .ok_or_else(|| EngineError::target_not_found(format!("tab {tab}")))?;
        entry.url = url.to_string();
        entry.title = Self::title_for(url);
        let info = entry.clone();
        drop(guard);

        self.calls.lock().push(ScriptedCall::Navigate {
            tab: tab.clone(),
            url: url.to_string(),
        });
        let _ = self.events.send(EngineEvent::NetworkRequest {
            tab: Some(tab.clone()),
            method: "GET".to_string(),
            url: url.to_string(),
        });
        let _ = self.events.send(EngineEvent::NetworkResponse {
            tab: Some(tab.clone()),
            url: url.to_string(),
            status: 200,
        });
        let _ = self.events.send(EngineEvent::PageNavigated {
            tab: tab.clone(),
            url: url.to_string(),
        });
        Ok(info)
    }

    async fn click(
        &self,
        session: &EngineSession,
        _tab: &TabId,
        node: NodeId,
        _opts: &ClickOptions,
    ) -> Result<(), EngineError> {
        self.pause().await;
        self.session(session)?;
        self.calls.lock().push(ScriptedCall::Click { node });
        Ok(())
    }

    async fn type_text(
        &self,
        session: &EngineSession,
        _tab: &TabId,
        node: NodeId,
        text: &str,
        _opts: &TypeOptions,
    ) -> Result<(), EngineError> {
        self.pause().await;
        self.session(session)?;
        self.calls.lock().push(ScriptedCall::Type {
            node,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn evaluate(
        &self,
        session: &EngineSession,
        _tab: &TabId,
        expression: &str,
        _node: Option<NodeId>,
    ) -> Result<Value, EngineError> {
        self.pause().await;
        self.session(session)?;
        self.calls.lock().push(ScriptedCall::Evaluate {
            expression: expression.to_string(),
        });
        Ok(self
            .eval_results
            .lock()
            .get(expression)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn snapshot(&self, session: &EngineSession, tab: &TabId) -> Result<AxNode, EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let url = {
            let guard = state.lock();
            guard
                .tabs
                .iter()
                .find(|info| &info.tab == tab)
                .map(|info| info.url.clone())
                .ok_or_else(|| EngineError::target_not_found(format!("tab {tab}")))?
        };
        Ok(self
            .pages
            .lock()
            .get(&url)
            .cloned()
            .unwrap_or_else(Self::default_tree))
    }

    async fn list_windows(&self, session: &EngineSession) -> Result<Vec<PageInfo>, EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let guard = state.lock();
        Ok(guard.tabs.clone())
    }

    async fn open_window(
        &self,
        session: &EngineSession,
        url: Option<&str>,
    ) -> Result<PageInfo, EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let url = url.unwrap_or("about:blank");
        let info = PageInfo {
            tab: TabId::new(),
            url: url.to_string(),
            title: Self::title_for(url),
        };
        state.lock().tabs.push(info.clone());
        let _ = self.events.send(EngineEvent::WindowOpened {
            tab: info.tab.clone(),
        });
        Ok(info)
    }

    async fn close_window(&self, session: &EngineSession, tab: &TabId) -> Result<(), EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let mut guard = state.lock();
        let before = guard.tabs.len();
        guard.tabs.retain(|info| &info.tab != tab);
        if guard.tabs.len() == before {
            return Err(EngineError::target_not_found(format!("tab {tab}")));
        }
        drop(guard);
        let _ = self.events.send(EngineEvent::WindowClosed { tab: tab.clone() });
        Ok(())
    }

    async fn activate_window(
        &self,
        session: &EngineSession,
        tab: &TabId,
    ) -> Result<(), EngineError> {
        self.pause().await;
        let state = self.session(session)?;
        let guard = state.lock();
        if !guard.tabs.iter().any(|info| &info.tab == tab) {
            return Err(EngineError::target_not_found(format!("tab {tab}")));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
