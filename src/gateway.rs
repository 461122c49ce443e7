//! Gateway assembly: registry, admission gate, session center, event tap
//! and the dispatch pipeline wired together around one engine backend.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use toolgate_cdp_adapter::{AutomationEngine, EngineEvent};
use toolgate_core_types::{ContentBlock, GatewayResult, ToolCall};
use toolgate_event_tap::{CapturedPayload, EventTap, TapConfig};
use toolgate_registry::{Dispatch, Dispatcher, ToolRegistry, ToolSpec};
use toolgate_scheduler::AdmissionGate;
use toolgate_session_center::SessionCenter;

use crate::config::GatewayConfig;
use crate::tools::{self, ToolContext};

pub struct Gateway {
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<Dispatcher>,
    gate: Arc<AdmissionGate>,
    sessions: Arc<SessionCenter>,
    tap: Arc<EventTap>,
    engine: Arc<dyn AutomationEngine>,
    shutdown: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        engine: Arc<dyn AutomationEngine>,
    ) -> GatewayResult<Arc<Self>> {
        let gate = AdmissionGate::new(config.admission.gate_config());
        let sessions = SessionCenter::new(Arc::clone(&engine));
        let tap = Arc::new(EventTap::new(TapConfig {
            max_events: config.capture.max_events,
        }));

        let registry = Arc::new(ToolRegistry::new());
        let context = Arc::new(ToolContext {
            sessions: Arc::clone(&sessions),
            tap: Arc::clone(&tap),
        });
        tools::register_builtin(&registry, &context)?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&gate),
            config.admission.call_timeout(),
        ));

        Ok(Arc::new(Self {
            registry,
            dispatcher,
            gate,
            sessions,
            tap,
            engine,
            shutdown: CancellationToken::new(),
            pump: Mutex::new(None),
        }))
    }

    /// Begin accepting work: subscribes the tap to the engine stream.
    pub async fn start(&self) {
        let mut events = self.engine.subscribe();
        let sessions = Arc::clone(&self.sessions);
        let tap = Arc::clone(&self.tap);
        let token = self.shutdown.clone();

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => record_event(&sessions, &tap, event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event pump lagged behind the engine");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        *self.pump.lock() = Some(pump);
        info!(tools = self.registry.len(), "gateway started");
    }

    /// Drain path: reject new admissions, wait for in-flight work, then
    /// close every session. Abrupt termination (signal) runs through here
    /// too before the process exits.
    pub async fn stop(&self) {
        info!(in_flight = self.gate.in_flight(), "gateway stopping");
        self.gate.close_and_drain().await;
        self.shutdown.cancel();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.sessions.close_all().await;
        info!("gateway stopped");
    }

    pub async fn call(&self, call: ToolCall) -> GatewayResult<Vec<ContentBlock>> {
        self.dispatcher.dispatch(call).await
    }

    /// Tool catalog in registration order; no side effects.
    pub fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// Registry handle, e.g. for embedding callers adding their own tools.
    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn sessions(&self) -> Arc<SessionCenter> {
        Arc::clone(&self.sessions)
    }

    pub fn tap(&self) -> Arc<EventTap> {
        Arc::clone(&self.tap)
    }

    pub fn gate(&self) -> Arc<AdmissionGate> {
        Arc::clone(&self.gate)
    }
}

async fn record_event(sessions: &SessionCenter, tap: &EventTap, event: EngineEvent) {
    let (tab, payload) = match event {
        EngineEvent::NetworkRequest {
            tab: Some(tab),
            method,
            url,
        } => (tab, CapturedPayload::Request { method, url }),
        EngineEvent::NetworkResponse {
            tab: Some(tab),
            url,
            status,
        } => (tab, CapturedPayload::Response { url, status }),
        EngineEvent::Console {
            tab: Some(tab),
            level,
            text,
        } => (tab, CapturedPayload::Console { level, text }),
        EngineEvent::Dialog {
            tab: Some(tab),
            kind,
            message,
        } => (
            tab,
            CapturedPayload::Dialog {
                dialog: kind,
                message,
            },
        ),
        _ => return,
    };

    if let Some(ctx) = sessions.find_by_tab(&tab).await {
        tap.record(&ctx.id, payload);
    }
}
