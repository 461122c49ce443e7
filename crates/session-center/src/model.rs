use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use toolgate_cdp_adapter::EngineSession;
use toolgate_core_types::{SessionId, TabId};
use toolgate_snapshot::RefStore;

/// Caller-visible view of one open window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindowHandle {
    pub tab: TabId,
    pub url: String,
    pub title: String,
    pub is_active: bool,
}

/// Window table of one session. At most one handle is active; the first
/// handle is the main window.
#[derive(Default)]
pub(crate) struct WindowTable {
    pub windows: Vec<WindowHandle>,
}

impl WindowTable {
    pub fn active(&self) -> Option<&WindowHandle> {
        self.windows.iter().find(|window| window.is_active)
    }

    pub fn activate(&mut self, tab: &TabId) {
        for window in &mut self.windows {
            window.is_active = &window.tab == tab;
        }
    }
}

/// One logical session: engine identity, window table, ref table and
/// activity timestamps.
pub struct SessionCtx {
    pub id: SessionId,
    pub name: String,
    pub engine: EngineSession,
    pub created_at: DateTime<Utc>,
    pub refs: RefStore,
    last_active: RwLock<DateTime<Utc>>,
    pub(crate) windows: Mutex<WindowTable>,
    closed: AtomicBool,
}

impl SessionCtx {
    pub(crate) fn new(name: impl Into<String>, engine: EngineSession) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            name: name.into(),
            engine,
            created_at: now,
            refs: RefStore::new(),
            last_active: RwLock::new(now),
            windows: Mutex::new(WindowTable::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn touch(&self) {
        *self.last_active.write() = Utc::now();
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.read()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
