use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use toolgate_core_types::{GatewayError, GatewayResult};

use crate::metrics;
use crate::model::AdmissionConfig;

struct GateState {
    slots: Arc<Semaphore>,
    in_flight: AtomicUsize,
    drained: Notify,
}

/// Bounded admission gate. At most `max_concurrent` slots are out at any
/// time; waiters are served in arrival order (the tokio semaphore queues
/// them fairly). Once closed, every acquire fails with `ShuttingDown`.
pub struct AdmissionGate {
    state: Arc<GateState>,
    config: AdmissionConfig,
}

impl AdmissionGate {
    pub fn new(config: AdmissionConfig) -> Arc<Self> {
        let capacity = config.max_concurrent.max(1);
        Arc::new(Self {
            state: Arc::new(GateState {
                slots: Arc::new(Semaphore::new(capacity)),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
            config,
        })
    }

    /// Acquire one execution slot, suspending FIFO when at capacity.
    ///
    /// Release happens when the returned slot drops; there is no manual
    /// release path, so a slot cannot be released twice or on behalf of
    /// another call.
    pub async fn acquire(&self) -> GatewayResult<ExecutionSlot> {
        let enqueued = Instant::now();
        let acquire = Arc::clone(&self.state.slots).acquire_owned();

        let permit = match self.config.queue_timeout {
            Some(budget) => match tokio::time::timeout(budget, acquire).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(GatewayError::ShuttingDown),
                Err(_) => return Err(GatewayError::timeout("admission", budget)),
            },
            None => acquire.await.map_err(|_| GatewayError::ShuttingDown)?,
        };

        let wait = enqueued.elapsed();
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        metrics::record_admitted(wait);
        debug!(wait_ms = wait.as_millis() as u64, "admission slot granted");

        Ok(ExecutionSlot {
            _permit: permit,
            state: Arc::clone(&self.state),
        })
    }

    /// Slots currently available without waiting.
    pub fn available(&self) -> usize {
        self.state.slots.available_permits()
    }

    /// Executions currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.config.max_concurrent.max(1)
    }

    pub fn is_closed(&self) -> bool {
        self.state.slots.is_closed()
    }

    /// Reject all future admissions, then wait until every outstanding
    /// slot has been returned.
    pub async fn close_and_drain(&self) {
        self.state.slots.close();
        loop {
            if self.state.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            self.state.drained.notified().await;
        }
        debug!("admission gate drained");
    }
}

/// Transient token for one admitted concurrent execution. Dropping the
/// slot returns the capacity exactly once, whatever path the handler took
/// to get there (success, error, timeout, cancellation).
pub struct ExecutionSlot {
    _permit: OwnedSemaphorePermit,
    state: Arc<GateState>,
}

impl std::fmt::Debug for ExecutionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSlot").finish_non_exhaustive()
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        let remaining = self.state.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_released();
        if remaining == 0 {
            // notify_one leaves a stored permit, so a drain arriving after
            // this drop still observes the wakeup.
            self.state.drained.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn gate(max: usize) -> Arc<AdmissionGate> {
        AdmissionGate::new(AdmissionConfig {
            max_concurrent: max,
            queue_timeout: Some(Duration::from_secs(2)),
        })
    }

    #[tokio::test]
    async fn grants_up_to_capacity_without_waiting() {
        let gate = gate(2);
        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn never_exceeds_capacity_under_contention() {
        let gate = gate(3);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let gate = Arc::clone(&gate);
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            tasks.push(tokio::spawn(async move {
                let slot = gate.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                drop(slot);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let gate = gate(1);
        let first = gate.acquire().await.unwrap();

        let order = Arc::new(order_log::OrderLog::default());
        let mut tasks = Vec::new();
        for i in 0..4 {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let slot = gate.acquire().await.unwrap();
                order.push(i);
                drop(slot);
            }));
            // Let the waiter join the queue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(first);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(order.snapshot(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn queue_timeout_surfaces_timeout_error() {
        let gate = AdmissionGate::new(AdmissionConfig {
            max_concurrent: 1,
            queue_timeout: Some(Duration::from_millis(20)),
        });
        let _held = gate.acquire().await.unwrap();
        let err = gate.acquire().await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn closed_gate_rejects_and_drain_waits_for_in_flight() {
        let gate = gate(2);
        let slot = gate.acquire().await.unwrap();

        let drainer = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.close_and_drain().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(gate.is_closed());
        assert!(!drainer.is_finished());

        let err = gate.acquire().await.unwrap_err();
        assert_eq!(err.kind(), "shutting_down");

        drop(slot);
        drainer.await.unwrap();
        assert_eq!(gate.in_flight(), 0);
    }

    mod order_log {
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct OrderLog(Mutex<Vec<usize>>);

        impl OrderLog {
            pub fn push(&self, value: usize) {
                self.0.lock().unwrap().push(value);
            }

            pub fn snapshot(&self) -> Vec<usize> {
                self.0.lock().unwrap().clone()
            }
        }
    }
}
