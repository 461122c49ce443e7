use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use toolgate_cdp_adapter::{AutomationEngine, SessionSpec};
use toolgate_core_types::{GatewayError, GatewayResult, TabId, Violation};

use crate::model::{SessionCtx, WindowHandle};

fn unknown_window(tab: &TabId) -> GatewayError {
    GatewayError::validation(vec![Violation::new(
        "tab_id",
        format!("no window with tab id `{tab}`"),
    )])
}

/// Owns every session and serializes all structural mutation on them.
pub struct SessionCenter {
    engine: Arc<dyn AutomationEngine>,
    sessions: DashMap<String, Arc<SessionCtx>>,
    /// Serializes lazy creation so one name never spawns two contexts.
    creating: Mutex<()>,
}

impl SessionCenter {
    pub fn new(engine: Arc<dyn AutomationEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sessions: DashMap::new(),
            creating: Mutex::new(()),
        })
    }

    pub fn engine(&self) -> Arc<dyn AutomationEngine> {
        Arc::clone(&self.engine)
    }

    /// Return the named session, creating it (context plus main window)
    /// on first use. A failed creation leaves no trace behind.
    pub async fn ensure(&self, name: &str) -> GatewayResult<Arc<SessionCtx>> {
        if let Some(existing) = self.get(name) {
            existing.touch();
            return Ok(existing);
        }

        let _guard = self.creating.lock().await;
        if let Some(existing) = self.get(name) {
            existing.touch();
            return Ok(existing);
        }

        let spec = SessionSpec::default();
        let engine_session = self.engine.create_session(&spec).await?;

        // The main window is part of session construction; roll the
        // context back if it cannot be opened.
        let main = match self.engine.open_window(&engine_session, None).await {
            Ok(info) => info,
            Err(err) => {
                if let Err(cleanup) = self.engine.close_session(&engine_session).await {
                    warn!(?cleanup, "rollback of half-created session failed");
                }
                return Err(err.into());
            }
        };

        let ctx = Arc::new(SessionCtx::new(name, engine_session));
        {
            let mut windows = ctx.windows.lock().await;
            windows.windows.push(WindowHandle {
                tab: main.tab,
                url: main.url,
                title: main.title,
                is_active: true,
            });
        }

        info!(session = %ctx.id, name, "session created");
        self.sessions.insert(name.to_string(), Arc::clone(&ctx));
        Ok(ctx)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SessionCtx>> {
        self.sessions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Session owning the given tab, if any. Used to attribute engine
    /// events back to a logical session.
    pub async fn find_by_tab(&self, tab: &TabId) -> Option<Arc<SessionCtx>> {
        let candidates: Vec<Arc<SessionCtx>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for ctx in candidates {
            let windows = ctx.windows.lock().await;
            if windows.windows.iter().any(|window| &window.tab == tab) {
                drop(windows);
                return Some(ctx);
            }
        }
        None
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Window the session currently points interactions at.
    pub async fn active_window(&self, ctx: &SessionCtx) -> GatewayResult<WindowHandle> {
        let windows = ctx.windows.lock().await;
        windows
            .active()
            .cloned()
            .ok_or_else(|| GatewayError::internal("session has no active window"))
    }

    pub async fn list_windows(&self, ctx: &SessionCtx) -> Vec<WindowHandle> {
        ctx.windows.lock().await.windows.clone()
    }

    /// Open a window and make it active, deactivating the prior one.
    pub async fn open_window(
        &self,
        ctx: &SessionCtx,
        url: Option<&str>,
    ) -> GatewayResult<WindowHandle> {
        let mut windows = ctx.windows.lock().await;
        let info = self.engine.open_window(&ctx.engine, url).await?;

        let handle = WindowHandle {
            tab: info.tab.clone(),
            url: info.url,
            title: info.title,
            is_active: true,
        };
        windows.windows.push(handle.clone());
        windows.activate(&info.tab);
        ctx.touch();
        Ok(handle)
    }

    /// Make an existing window the active one.
    pub async fn switch_window(&self, ctx: &SessionCtx, tab: &TabId) -> GatewayResult<WindowHandle> {
        let mut windows = ctx.windows.lock().await;
        if !windows.windows.iter().any(|window| &window.tab == tab) {
            return Err(unknown_window(tab));
        }

        self.engine.activate_window(&ctx.engine, tab).await?;
        windows.activate(tab);
        ctx.touch();
        Ok(windows.active().cloned().expect("just activated"))
    }

    /// Close a window. Closing the active one falls back to the main
    /// window; closing the last remaining window is refused and the table
    /// stays untouched.
    pub async fn close_window(&self, ctx: &SessionCtx, tab: &TabId) -> GatewayResult<()> {
        let mut windows = ctx.windows.lock().await;
        let position = windows
            .windows
            .iter()
            .position(|window| &window.tab == tab)
            .ok_or_else(|| unknown_window(tab))?;

        if windows.windows.len() == 1 {
            return Err(GatewayError::LastWindow);
        }

        self.engine.close_window(&ctx.engine, tab).await?;
        let removed = windows.windows.remove(position);

        if removed.is_active {
            let main = windows.windows[0].tab.clone();
            if let Err(err) = self.engine.activate_window(&ctx.engine, &main).await {
                warn!(?err, "failed to activate fallback window");
            }
            windows.activate(&main);
        }
        ctx.touch();
        Ok(())
    }

    /// Record the result of a navigation on the window table.
    pub async fn note_navigation(&self, ctx: &SessionCtx, tab: &TabId, url: &str, title: &str) {
        let mut windows = ctx.windows.lock().await;
        if let Some(window) = windows.windows.iter_mut().find(|window| &window.tab == tab) {
            window.url = url.to_string();
            window.title = title.to_string();
        }
        ctx.touch();
    }

    /// Tear down a session: windows, refs, engine context. Idempotent:
    /// closing an unknown or already-closed session is a no-op.
    pub async fn close(&self, name: &str) -> GatewayResult<bool> {
        let Some((_, ctx)) = self.sessions.remove(name) else {
            return Ok(false);
        };
        if !ctx.mark_closed() {
            return Ok(false);
        }

        {
            let mut windows = ctx.windows.lock().await;
            windows.windows.clear();
        }
        ctx.refs.invalidate_all();

        if let Err(err) = self.engine.close_session(&ctx.engine).await {
            warn!(session = %ctx.id, ?err, "engine session teardown failed");
        }
        info!(session = %ctx.id, name, "session closed");
        Ok(true)
    }

    /// Close every session; used by the shutdown drain path.
    pub async fn close_all(&self) {
        let names: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            if let Err(err) = self.close(&name).await {
                warn!(name, ?err, "session close during shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_cdp_adapter::ScriptedEngine;

    fn center() -> Arc<SessionCenter> {
        SessionCenter::new(Arc::new(ScriptedEngine::new()))
    }

    #[tokio::test]
    async fn ensure_is_lazy_and_reuses_sessions() {
        let center = center();
        assert_eq!(center.count(), 0);

        let first = center.ensure("default").await.unwrap();
        let second = center.ensure("default").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(center.count(), 1);

        let windows = center.list_windows(&first).await;
        assert_eq!(windows.len(), 1);
        assert!(windows[0].is_active);
    }

    #[tokio::test]
    async fn open_window_activates_and_deactivates_prior() {
        let center = center();
        let ctx = center.ensure("default").await.unwrap();

        let second = center
            .open_window(&ctx, Some("https://example.com"))
            .await
            .unwrap();
        let windows = center.list_windows(&ctx).await;
        assert_eq!(windows.len(), 2);
        assert!(!windows[0].is_active);
        assert!(windows[1].is_active);
        assert_eq!(windows[1].tab, second.tab);

        let active = center.active_window(&ctx).await.unwrap();
        assert_eq!(active.tab, second.tab);
    }

    #[tokio::test]
    async fn closing_the_active_window_falls_back_to_main() {
        let center = center();
        let ctx = center.ensure("default").await.unwrap();
        let main = center.active_window(&ctx).await.unwrap();
        let second = center.open_window(&ctx, None).await.unwrap();

        center.close_window(&ctx, &second.tab).await.unwrap();
        let active = center.active_window(&ctx).await.unwrap();
        assert_eq!(active.tab, main.tab);
    }

    #[tokio::test]
    async fn closing_the_last_window_fails_and_keeps_the_table() {
        let center = center();
        let ctx = center.ensure("default").await.unwrap();
        let main = center.active_window(&ctx).await.unwrap();

        let err = center.close_window(&ctx, &main.tab).await.unwrap_err();
        assert_eq!(err.kind(), "last_window");

        let windows = center.list_windows(&ctx).await;
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].tab, main.tab);
        assert!(windows[0].is_active);
    }

    #[tokio::test]
    async fn switch_window_rejects_unknown_tabs() {
        let center = center();
        let ctx = center.ensure("default").await.unwrap();
        let err = center
            .switch_window(&ctx, &TabId("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_invalidates_refs() {
        let center = center();
        let ctx = center.ensure("default").await.unwrap();
        let generation_before = ctx.refs.generation();

        assert!(center.close("default").await.unwrap());
        assert!(!center.close("default").await.unwrap());
        assert_eq!(center.count(), 0);
        assert!(ctx.refs.generation() > generation_before);
        assert!(ctx.is_closed());
    }

    #[tokio::test]
    async fn close_all_empties_the_table() {
        let center = center();
        center.ensure("a").await.unwrap();
        center.ensure("b").await.unwrap();
        center.close_all().await;
        assert_eq!(center.count(), 0);
    }
}
