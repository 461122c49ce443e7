use serde::{Deserialize, Serialize};

use toolgate_core_types::TabId;

/// Raw events emitted by an engine backend before the tap records them.
///
/// Events carry the tab they originated from when the backend can attribute
/// them; the gateway maps tabs back to logical sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineEvent {
    PageNavigated {
        tab: TabId,
        url: String,
    },
    NetworkRequest {
        tab: Option<TabId>,
        method: String,
        url: String,
    },
    NetworkResponse {
        tab: Option<TabId>,
        url: String,
        status: i64,
    },
    Console {
        tab: Option<TabId>,
        level: String,
        text: String,
    },
    Dialog {
        tab: Option<TabId>,
        kind: String,
        message: String,
    },
    WindowOpened {
        tab: TabId,
    },
    WindowClosed {
        tab: TabId,
    },
}
