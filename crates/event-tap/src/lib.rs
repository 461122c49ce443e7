//! Append-only event capture.
//!
//! Each session may have one capture window at a time. While it records,
//! events append in arrival order under a per-window sequence; once capture
//! stops the record is frozen and stays readable until the next start or
//! the session goes away.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use toolgate_core_types::SessionId;

/// Which event families a capture window records.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureDomain {
    Network,
    Console,
    Dialog,
}

impl CaptureDomain {
    pub const ALL: [CaptureDomain; 3] = [Self::Network, Self::Console, Self::Dialog];
}

/// Payload of one captured record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapturedPayload {
    Request { method: String, url: String },
    Response { url: String, status: i64 },
    Console { level: String, text: String },
    Dialog { dialog: String, message: String },
}

impl CapturedPayload {
    pub fn domain(&self) -> CaptureDomain {
        match self {
            Self::Request { .. } | Self::Response { .. } => CaptureDomain::Network,
            Self::Console { .. } => CaptureDomain::Console,
            Self::Dialog { .. } => CaptureDomain::Dialog,
        }
    }
}

/// One record of a capture window. Immutable once appended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: CapturedPayload,
}

#[derive(Clone, Debug)]
pub struct TapConfig {
    /// Hard cap on records kept per capture window.
    pub max_events: usize,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self { max_events: 4096 }
    }
}

#[derive(Default)]
struct CaptureLog {
    recording: bool,
    domains: HashSet<CaptureDomain>,
    next_seq: u64,
    events: Vec<CapturedEvent>,
    dropped: u64,
}

/// Per-session capture windows fed from the engine's event stream.
pub struct EventTap {
    logs: DashMap<SessionId, Mutex<CaptureLog>>,
    config: TapConfig,
}

impl EventTap {
    pub fn new(config: TapConfig) -> Self {
        Self {
            logs: DashMap::new(),
            config,
        }
    }

    /// Begin a capture window, discarding any previous record for the
    /// session. Returns the domains now recording.
    pub fn start(&self, session: &SessionId, domains: &[CaptureDomain]) -> Vec<CaptureDomain> {
        let domains: HashSet<CaptureDomain> = if domains.is_empty() {
            CaptureDomain::ALL.into_iter().collect()
        } else {
            domains.iter().copied().collect()
        };

        let entry = self.logs.entry(session.clone()).or_default();
        let mut log = entry.lock();
        *log = CaptureLog {
            recording: true,
            domains: domains.clone(),
            next_seq: 0,
            events: Vec::new(),
            dropped: 0,
        };
        debug!(%session, ?domains, "capture started");
        CaptureDomain::ALL
            .into_iter()
            .filter(|domain| domains.contains(domain))
            .collect()
    }

    /// Freeze the capture window. Idempotent; returns the number of
    /// records kept.
    pub fn stop(&self, session: &SessionId) -> usize {
        match self.logs.get(session) {
            Some(entry) => {
                let mut log = entry.lock();
                log.recording = false;
                log.events.len()
            }
            None => 0,
        }
    }

    pub fn is_recording(&self, session: &SessionId) -> bool {
        self.logs
            .get(session)
            .map(|entry| entry.lock().recording)
            .unwrap_or(false)
    }

    /// Append one record if the session is recording its domain.
    pub fn record(&self, session: &SessionId, payload: CapturedPayload) {
        let Some(entry) = self.logs.get(session) else {
            return;
        };
        let mut log = entry.lock();
        if !log.recording || !log.domains.contains(&payload.domain()) {
            return;
        }
        if log.events.len() >= self.config.max_events {
            log.dropped += 1;
            return;
        }
        let seq = log.next_seq;
        log.next_seq += 1;
        log.events.push(CapturedEvent {
            seq,
            at: Utc::now(),
            payload,
        });
    }

    /// The captured sequence so far, in append order.
    pub fn events(&self, session: &SessionId) -> Vec<CapturedEvent> {
        self.logs
            .get(session)
            .map(|entry| entry.lock().events.clone())
            .unwrap_or_default()
    }

    /// Records dropped on the floor after the cap was hit.
    pub fn dropped(&self, session: &SessionId) -> u64 {
        self.logs
            .get(session)
            .map(|entry| entry.lock().dropped)
            .unwrap_or(0)
    }

    /// Forget everything about the session.
    pub fn clear(&self, session: &SessionId) {
        self.logs.remove(session);
    }
}

impl Default for EventTap {
    fn default() -> Self {
        Self::new(TapConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> CapturedPayload {
        CapturedPayload::Request {
            method: "GET".into(),
            url: url.into(),
        }
    }

    #[test]
    fn records_in_order_while_recording() {
        let tap = EventTap::default();
        let session = SessionId::new();

        tap.record(&session, request("https://ignored.example"));
        tap.start(&session, &[CaptureDomain::Network]);
        tap.record(&session, request("https://a.example"));
        tap.record(&session, request("https://b.example"));

        let events = tap.events(&session);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
    }

    #[test]
    fn stop_freezes_the_record() {
        let tap = EventTap::default();
        let session = SessionId::new();
        tap.start(&session, &[]);
        tap.record(&session, request("https://a.example"));

        assert_eq!(tap.stop(&session), 1);
        tap.record(&session, request("https://late.example"));
        assert_eq!(tap.events(&session).len(), 1);

        // Stopping again changes nothing.
        assert_eq!(tap.stop(&session), 1);
    }

    #[test]
    fn domains_filter_what_is_kept() {
        let tap = EventTap::default();
        let session = SessionId::new();
        tap.start(&session, &[CaptureDomain::Console]);

        tap.record(&session, request("https://a.example"));
        tap.record(
            &session,
            CapturedPayload::Console {
                level: "warn".into(),
                text: "low disk".into(),
            },
        );

        let events = tap.events(&session);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].payload,
            CapturedPayload::Console { .. }
        ));
    }

    #[test]
    fn cap_drops_overflow_without_reordering() {
        let tap = EventTap::new(TapConfig { max_events: 2 });
        let session = SessionId::new();
        tap.start(&session, &[]);
        for i in 0..5 {
            tap.record(&session, request(&format!("https://{i}.example")));
        }
        assert_eq!(tap.events(&session).len(), 2);
        assert_eq!(tap.dropped(&session), 3);
    }

    #[test]
    fn restart_discards_the_previous_window() {
        let tap = EventTap::default();
        let session = SessionId::new();
        tap.start(&session, &[]);
        tap.record(&session, request("https://first.example"));
        tap.stop(&session);

        tap.start(&session, &[]);
        assert!(tap.events(&session).is_empty());
        assert!(tap.is_recording(&session));
    }
}
