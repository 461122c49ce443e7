//! Low-level CDP command/event plumbing.
//!
//! The engine speaks raw protocol methods through [`CdpTransport`]; the
//! chromium-backed implementation multiplexes commands and events over a
//! single websocket connection owned by a background loop.

use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineErrorKind};
use crate::util::extract_ws_url;

/// Decoded protocol event forwarded to the engine.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Where a command is addressed: the browser endpoint or an attached
/// page session.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), EngineError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError>;
}

/// Transport that refuses every command; placeholder for wiring tests.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, EngineError> {
        Err(EngineError::internal(format!(
            "transport not available for method {method}"
        )))
    }
}

pub struct ChromiumTransport {
    cfg: EngineConfig,
    state: OnceCell<Arc<RuntimeState>>,
}

impl ChromiumTransport {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            state: OnceCell::new(),
        }
    }

    async fn runtime(&self) -> Result<Arc<RuntimeState>, EngineError> {
        let cfg = self.cfg.clone();
        self.state
            .get_or_try_init(|| async move { RuntimeState::start(cfg).await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), EngineError> {
        let runtime = self.runtime().await?;
        let deadline = Duration::from_millis(self.cfg.command_deadline_ms);

        runtime
            .send(
                CommandTarget::Browser,
                "Target.setDiscoverTargets",
                serde_json::json!({ "discover": true }),
                deadline,
            )
            .await?;
        runtime
            .send(
                CommandTarget::Browser,
                "Target.setAutoAttach",
                serde_json::json!({
                    "autoAttach": true,
                    "waitForDebuggerOnStart": false,
                    "flatten": true,
                }),
                deadline,
            )
            .await?;
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.runtime().await {
            Ok(runtime) => runtime.next_event().await,
            Err(err) => {
                warn!(?err, "cdp transport not ready");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, EngineError> {
        let runtime = self.runtime().await?;
        runtime
            .send(
                target,
                method,
                params,
                Duration::from_millis(self.cfg.command_deadline_ms),
            )
            .await
    }
}

struct ControlMessage {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, EngineError>>,
}

struct RuntimeState {
    command_tx: mpsc::Sender<ControlMessage>,
    events_rx: Mutex<mpsc::Receiver<TransportEvent>>,
    loop_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl RuntimeState {
    async fn start(cfg: EngineConfig) -> Result<Self, EngineError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let browser_cfg = Self::browser_config(&cfg)?;
                let mut child = browser_cfg
                    .launch()
                    .map_err(|err| EngineError::internal(format!("failed to launch chromium: {err}")))?;
                let ws_url = extract_ws_url(&mut child)
                    .await
                    .map_err(|err| EngineError::io(err.to_string()))?;
                (Some(child), ws_url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| EngineError::io(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(128);
        let (events_tx, events_rx) = mpsc::channel(512);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = Arc::clone(&alive);

        let loop_task = tokio::spawn(async move {
            if let Err(err) = Self::run_loop(conn, command_rx, events_tx).await {
                error!(?err, "cdp transport loop terminated");
            }
            loop_alive.store(false, Ordering::Relaxed);
        });

        info!(url = %ws_url, "chromium connection established");

        Ok(Self {
            command_tx,
            events_rx: Mutex::new(events_rx),
            loop_task,
            child: Mutex::new(child),
            alive,
        })
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, EngineError> {
        if !self.alive.load(Ordering::Relaxed) {
            return Err(EngineError::io("cdp transport loop is not running"));
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        self.command_tx
            .send(ControlMessage {
                target,
                method: method.to_string(),
                params,
                responder: resp_tx,
            })
            .await
            .map_err(|err| EngineError::io(err.to_string()))?;

        match tokio::time::timeout(deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::io("command response channel closed")),
            Err(_) => Err(EngineError::new(EngineErrorKind::Timeout)
                .with_hint(format!("{method} exceeded {}ms", deadline.as_millis()))
                .retriable(true)),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events_rx.lock().await.recv().await
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<ControlMessage>,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), EngineError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, EngineError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    let session = match cmd.target {
                        CommandTarget::Browser => None,
                        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                    };
                    let method: MethodId = cmd.method.clone().into();
                    match conn.submit_command(method, session, cmd.params) {
                        Ok(call_id) => {
                            inflight.insert(call_id, cmd.responder);
                        }
                        Err(err) => {
                            let _ = cmd
                                .responder
                                .send(Err(EngineError::io(err.to_string())));
                        }
                    }
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::handle_response(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(event))) => {
                            Self::forward_event(event, &events_tx).await;
                        }
                        Some(Err(err)) => {
                            let io_err = EngineError::io(err.to_string());
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(io_err.clone()));
                            }
                            return Err(io_err);
                        }
                        None => {
                            let closed = EngineError::io("cdp connection closed");
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(closed.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_response(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, EngineError>>>,
    ) {
        let result = if let Some(result) = resp.result {
            Ok(result)
        } else if let Some(protocol_err) = resp.error {
            Err(EngineError::protocol(format!(
                "cdp error {}: {}",
                protocol_err.code, protocol_err.message
            )))
        } else {
            Err(EngineError::internal("empty cdp response"))
        };

        if let Some(sender) = inflight.remove(&resp.id) {
            let _ = sender.send(result);
        }
    }

    async fn forward_event(event: CdpEventMessage, events_tx: &mpsc::Sender<TransportEvent>) {
        let raw: CdpJsonEventMessage = match event.try_into() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "failed to decode cdp event");
                return;
            }
        };
        let _ = events_tx
            .send(TransportEvent {
                method: raw.method.into_owned(),
                params: raw.params,
                session_id: raw.session_id,
            })
            .await;
    }

    fn browser_config(cfg: &EngineConfig) -> Result<BrowserConfig, EngineError> {
        if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
            return Err(EngineError::io(format!(
                "chrome executable not found at {} (set TOOLGATE_CHROME)",
                cfg.executable.display()
            )));
        }

        std::fs::create_dir_all(&cfg.user_data_dir)
            .map_err(|err| EngineError::internal(format!("failed to ensure user-data-dir: {err}")))?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_millis(cfg.command_deadline_ms))
            .launch_timeout(Duration::from_secs(20))
            .user_data_dir(cfg.user_data_dir.clone());

        if !cfg.headless {
            builder = builder.with_head();
        }

        let mut args = vec![
            "--disable-background-networking",
            "--disable-breakpad",
            "--disable-default-apps",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-hang-monitor",
            "--disable-popup-blocking",
            "--disable-sync",
            "--metrics-recording-only",
            "--no-first-run",
            "--no-default-browser-check",
            "--password-store=basic",
            "--remote-allow-origins=*",
        ];
        if cfg.headless {
            args.push("--headless=new");
            args.push("--hide-scrollbars");
            args.push("--mute-audio");
        }
        builder = builder.args(args);

        if !cfg.executable.as_os_str().is_empty() {
            builder = builder.chrome_executable(cfg.executable.clone());
        }

        builder
            .build()
            .map_err(|err| EngineError::internal(format!("browser config error: {err}")))
    }
}

impl Drop for RuntimeState {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(?err, "failed to kill chromium child");
                        }
                    });
                }
            }
        }
    }
}
