//! CDP-backed implementation of the engine trait.
//!
//! Sessions map to browser contexts, tabs to page targets attached in flat
//! mode. Commands ride the transport; protocol events are pumped into a
//! broadcast stream the gateway's tap consumes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use toolgate_core_types::{AxNode, NodeId, TabId};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::ports::{
    AutomationEngine, ClickOptions, EngineSession, PageInfo, SessionSpec, TypeOptions,
};
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

const EVENT_BUFFER: usize = 512;

/// Roles the snapshot marks as interaction targets.
const INTERACTABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "slider",
    "switch",
    "tab",
];

#[derive(Clone, Debug)]
struct TabEntry {
    cdp_session: String,
    context: String,
}

pub struct CdpEngine {
    transport: Arc<dyn CdpTransport>,
    tabs: DashMap<TabId, TabEntry>,
    by_cdp_session: DashMap<String, TabId>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: CancellationToken,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl CdpEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_transport(Arc::new(ChromiumTransport::new(config)))
    }

    pub fn with_transport(transport: Arc<dyn CdpTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            transport,
            tabs: DashMap::new(),
            by_cdp_session: DashMap::new(),
            events,
            shutdown: CancellationToken::new(),
            pump: parking_lot::Mutex::new(None),
        }
    }

    /// Connect the transport and start pumping protocol events.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        self.transport.start().await?;

        let engine = Arc::clone(self);
        let token = self.shutdown.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = engine.transport.next_event() => {
                        match event {
                            Some(event) => engine.route_event(event),
                            None => break,
                        }
                    }
                }
            }
        });
        *self.pump.lock() = Some(pump);
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    fn route_event(&self, event: TransportEvent) {
        let tab = event
            .session_id
            .as_ref()
            .and_then(|id| self.by_cdp_session.get(id).map(|entry| entry.value().clone()));

        let mapped = match event.method.as_str() {
            "Network.requestWillBeSent" => Some(EngineEvent::NetworkRequest {
                tab,
                method: event.params["request"]["method"]
                    .as_str()
                    .unwrap_or("GET")
                    .to_string(),
                url: event.params["request"]["url"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            }),
            "Network.responseReceived" => Some(EngineEvent::NetworkResponse {
                tab,
                url: event.params["response"]["url"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                status: event.params["response"]["status"].as_i64().unwrap_or(0),
            }),
            "Runtime.consoleAPICalled" => {
                let text = event.params["args"]
                    .as_array()
                    .map(|args| {
                        args.iter()
                            .filter_map(|arg| {
                                arg.get("value").and_then(Value::as_str).map(str::to_string)
                            })
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                Some(EngineEvent::Console {
                    tab,
                    level: event.params["type"].as_str().unwrap_or("log").to_string(),
                    text,
                })
            }
            "Page.javascriptDialogOpening" => Some(EngineEvent::Dialog {
                tab,
                kind: event.params["type"].as_str().unwrap_or("alert").to_string(),
                message: event.params["message"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            }),
            "Page.frameNavigated" => {
                let url = event.params["frame"]["url"].as_str().unwrap_or_default();
                tab.map(|tab| EngineEvent::PageNavigated {
                    tab,
                    url: url.to_string(),
                })
            }
            _ => None,
        };

        if let Some(mapped) = mapped {
            let _ = self.events.send(mapped);
        }
    }

    fn tab_entry(&self, tab: &TabId) -> Result<TabEntry, EngineError> {
        self.tabs
            .get(tab)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::target_not_found(format!("tab {tab} is not attached")))
    }

    async fn page_command(
        &self,
        tab: &TabId,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError> {
        let entry = self.tab_entry(tab)?;
        self.transport
            .send_command(CommandTarget::Session(entry.cdp_session), method, params)
            .await
    }

    async fn attach(&self, context: &str, target_id: &str) -> Result<TabId, EngineError> {
        let attached = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let cdp_session = attached["sessionId"]
            .as_str()
            .ok_or_else(|| EngineError::protocol("attachToTarget missing sessionId"))?
            .to_string();

        let tab = TabId(target_id.to_string());
        for domain in ["Page", "Runtime", "DOM", "Network", "Accessibility"] {
            self.transport
                .send_command(
                    CommandTarget::Session(cdp_session.clone()),
                    &format!("{domain}.enable"),
                    json!({}),
                )
                .await?;
        }

        self.by_cdp_session.insert(cdp_session.clone(), tab.clone());
        self.tabs.insert(
            tab.clone(),
            TabEntry {
                cdp_session,
                context: context.to_string(),
            },
        );
        Ok(tab)
    }

    async fn resolve_object(&self, tab: &TabId, node: NodeId) -> Result<String, EngineError> {
        let resolved = self
            .page_command(tab, "DOM.resolveNode", json!({ "backendNodeId": node.0 }))
            .await?;
        resolved["object"]["objectId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::target_not_found(format!("node {} has no object", node.0)))
    }

    async fn node_center(&self, tab: &TabId, node: NodeId) -> Result<(f64, f64), EngineError> {
        let model = self
            .page_command(tab, "DOM.getBoxModel", json!({ "backendNodeId": node.0 }))
            .await?;
        let quad = model["model"]["content"]
            .as_array()
            .ok_or_else(|| EngineError::target_not_found(format!("node {} has no box", node.0)))?;
        let xs: Vec<f64> = quad.iter().step_by(2).filter_map(Value::as_f64).collect();
        let ys: Vec<f64> = quad
            .iter()
            .skip(1)
            .step_by(2)
            .filter_map(Value::as_f64)
            .collect();
        if xs.is_empty() || ys.is_empty() {
            return Err(EngineError::protocol("malformed box model quad"));
        }
        let cx = xs.iter().sum::<f64>() / xs.len() as f64;
        let cy = ys.iter().sum::<f64>() / ys.len() as f64;
        Ok((cx, cy))
    }
}

#[async_trait]
impl AutomationEngine for CdpEngine {
    async fn create_session(&self, spec: &SessionSpec) -> Result<EngineSession, EngineError> {
        let mut params = json!({});
        if spec.profile.is_none() {
            params["disposeOnDetach"] = json!(true);
        }
        let created = self
            .transport
            .send_command(CommandTarget::Browser, "Target.createBrowserContext", params)
            .await?;
        let context = created["browserContextId"]
            .as_str()
            .ok_or_else(|| EngineError::protocol("createBrowserContext missing id"))?;
        debug!(context, "browser context created");
        Ok(EngineSession(context.to_string()))
    }

    async fn close_session(&self, session: &EngineSession) -> Result<(), EngineError> {
        let owned: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|entry| entry.value().context == session.0)
            .map(|entry| entry.key().clone())
            .collect();
        for tab in owned {
            if let Err(err) = self.close_window(session, &tab).await {
                warn!(%tab, ?err, "failed to close tab during session teardown");
            }
        }

        match self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.disposeBrowserContext",
                json!({ "browserContextId": session.0 }),
            )
            .await
        {
            Ok(_) => Ok(()),
            // Disposing an unknown context is fine: the session is already gone.
            Err(err) => {
                debug!(context = %session.0, ?err, "dispose context failed");
                Ok(())
            }
        }
    }

    async fn navigate(
        &self,
        _session: &EngineSession,
        tab: &TabId,
        url: &str,
    ) -> Result<PageInfo, EngineError> {
        let navigated = self
            .page_command(tab, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = navigated["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(EngineError::io(format!("navigation failed: {error_text}")));
            }
        }

        let title = self
            .page_command(
                tab,
                "Runtime.evaluate",
                json!({ "expression": "document.title", "returnByValue": true }),
            )
            .await
            .ok()
            .and_then(|value| value["result"]["value"].as_str().map(str::to_string))
            .unwrap_or_default();

        Ok(PageInfo {
            tab: tab.clone(),
            url: url.to_string(),
            title,
        })
    }

    async fn click(
        &self,
        _session: &EngineSession,
        tab: &TabId,
        node: NodeId,
        opts: &ClickOptions,
    ) -> Result<(), EngineError> {
        self.page_command(
            tab,
            "DOM.scrollIntoViewIfNeeded",
            json!({ "backendNodeId": node.0 }),
        )
        .await?;
        let (x, y) = self.node_center(tab, node).await?;

        for phase in ["mousePressed", "mouseReleased"] {
            self.page_command(
                tab,
                "Input.dispatchMouseEvent",
                json!({
                    "type": phase,
                    "x": x,
                    "y": y,
                    "button": opts.button.as_str(),
                    "clickCount": opts.click_count,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn type_text(
        &self,
        _session: &EngineSession,
        tab: &TabId,
        node: NodeId,
        text: &str,
        opts: &TypeOptions,
    ) -> Result<(), EngineError> {
        self.page_command(tab, "DOM.focus", json!({ "backendNodeId": node.0 }))
            .await?;

        if opts.clear {
            let object_id = self.resolve_object(tab, node).await?;
            self.page_command(
                tab,
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": "function() { this.value = ''; }",
                }),
            )
            .await?;
        }

        self.page_command(tab, "Input.insertText", json!({ "text": text }))
            .await?;

        if opts.submit {
            for phase in ["rawKeyDown", "keyUp"] {
                self.page_command(
                    tab,
                    "Input.dispatchKeyEvent",
                    json!({
                        "type": phase,
                        "key": "Enter",
                        "code": "Enter",
                        "windowsVirtualKeyCode": 13,
                    }),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        _session: &EngineSession,
        tab: &TabId,
        expression: &str,
        node: Option<NodeId>,
    ) -> Result<Value, EngineError> {
        let response = match node {
            Some(node) => {
                let object_id = self.resolve_object(tab, node).await?;
                self.page_command(
                    tab,
                    "Runtime.callFunctionOn",
                    json!({
                        "objectId": object_id,
                        "functionDeclaration": expression,
                        "returnByValue": true,
                        "awaitPromise": true,
                    }),
                )
                .await?
            }
            None => {
                self.page_command(
                    tab,
                    "Runtime.evaluate",
                    json!({
                        "expression": expression,
                        "returnByValue": true,
                        "awaitPromise": true,
                    }),
                )
                .await?
            }
        };

        if let Some(exception) = response.get("exceptionDetails") {
            return Err(EngineError::protocol(format!(
                "evaluate raised: {}",
                exception["text"].as_str().unwrap_or("exception")
            )));
        }
        Ok(response["result"]["value"].clone())
    }

    async fn snapshot(&self, _session: &EngineSession, tab: &TabId) -> Result<AxNode, EngineError> {
        let response = self
            .page_command(tab, "Accessibility.getFullAXTree", json!({}))
            .await?;
        let nodes = response["nodes"]
            .as_array()
            .ok_or_else(|| EngineError::protocol("getFullAXTree missing nodes"))?;
        build_ax_tree(nodes)
    }

    async fn list_windows(&self, session: &EngineSession) -> Result<Vec<PageInfo>, EngineError> {
        let response = self
            .transport
            .send_command(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let infos = response["targetInfos"]
            .as_array()
            .ok_or_else(|| EngineError::protocol("getTargets missing targetInfos"))?;

        Ok(infos
            .iter()
            .filter(|info| {
                info["type"].as_str() == Some("page")
                    && info["browserContextId"].as_str() == Some(session.0.as_str())
            })
            .map(|info| PageInfo {
                tab: TabId(info["targetId"].as_str().unwrap_or_default().to_string()),
                url: info["url"].as_str().unwrap_or_default().to_string(),
                title: info["title"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn open_window(
        &self,
        session: &EngineSession,
        url: Option<&str>,
    ) -> Result<PageInfo, EngineError> {
        let url = url.unwrap_or("about:blank");
        let created = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": url, "browserContextId": session.0 }),
            )
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| EngineError::protocol("createTarget missing targetId"))?;

        let tab = self.attach(&session.0, target_id).await?;
        let _ = self.events.send(EngineEvent::WindowOpened { tab: tab.clone() });
        Ok(PageInfo {
            tab,
            url: url.to_string(),
            title: String::new(),
        })
    }

    async fn close_window(&self, _session: &EngineSession, tab: &TabId) -> Result<(), EngineError> {
        self.transport
            .send_command(
                CommandTarget::Browser,
                "Target.closeTarget",
                json!({ "targetId": tab.0 }),
            )
            .await?;
        if let Some((_, entry)) = self.tabs.remove(tab) {
            self.by_cdp_session.remove(&entry.cdp_session);
        }
        let _ = self.events.send(EngineEvent::WindowClosed { tab: tab.clone() });
        Ok(())
    }

    async fn activate_window(
        &self,
        _session: &EngineSession,
        tab: &TabId,
    ) -> Result<(), EngineError> {
        self.transport
            .send_command(
                CommandTarget::Browser,
                "Target.activateTarget",
                json!({ "targetId": tab.0 }),
            )
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Fold the flat AX node list into a tree, dropping ignored nodes and
/// promoting their children.
fn build_ax_tree(nodes: &[Value]) -> Result<AxNode, EngineError> {
    let by_id: HashMap<&str, &Value> = nodes
        .iter()
        .filter_map(|node| node["nodeId"].as_str().map(|id| (id, node)))
        .collect();

    let root = nodes
        .iter()
        .find(|node| node.get("parentId").is_none())
        .or_else(|| nodes.first())
        .ok_or_else(|| EngineError::protocol("empty accessibility tree"))?;

    fn convert(raw: &Value, by_id: &HashMap<&str, &Value>) -> Vec<AxNode> {
        let children: Vec<AxNode> = raw["childIds"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| by_id.get(id))
                    .flat_map(|child| convert(child, by_id))
                    .collect()
            })
            .unwrap_or_default();

        if raw["ignored"].as_bool().unwrap_or(false) {
            return children;
        }

        let role = raw["role"]["value"].as_str().unwrap_or("generic");
        let mut node = AxNode::new(
            NodeId(raw["backendDOMNodeId"].as_u64().unwrap_or(0)),
            role,
        );
        if let Some(name) = raw["name"]["value"].as_str() {
            if !name.is_empty() {
                node = node.with_name(name);
            }
        }
        if let Some(value) = raw["value"]["value"].as_str() {
            node = node.with_value(value);
        }
        if INTERACTABLE_ROLES.contains(&role) {
            node = node.interactable();
        }
        vec![node.with_children(children)]
    }

    convert(root, &by_id)
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::protocol("accessibility tree root was ignored"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ax_tree_folds_ignored_nodes() {
        let nodes = vec![
            json!({
                "nodeId": "1",
                "role": { "value": "RootWebArea" },
                "backendDOMNodeId": 10,
                "childIds": ["2"],
            }),
            json!({
                "nodeId": "2",
                "parentId": "1",
                "ignored": true,
                "role": { "value": "generic" },
                "childIds": ["3"],
            }),
            json!({
                "nodeId": "3",
                "parentId": "2",
                "role": { "value": "button" },
                "name": { "value": "Submit" },
                "backendDOMNodeId": 33,
                "childIds": [],
            }),
        ];

        let tree = build_ax_tree(&nodes).unwrap();
        assert_eq!(tree.role, "RootWebArea");
        assert_eq!(tree.children.len(), 1);
        let button = &tree.children[0];
        assert_eq!(button.role, "button");
        assert_eq!(button.name.as_deref(), Some("Submit"));
        assert!(button.interactable);
        assert_eq!(button.node, NodeId(33));
    }
}
