use std::time::Duration;

/// Tuning knobs for the admission gate.
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Maximum number of concurrently admitted executions.
    pub max_concurrent: usize,
    /// How long a caller may wait in the admission queue before the gate
    /// gives up on its behalf. `None` waits indefinitely.
    pub queue_timeout: Option<Duration>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            queue_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl AdmissionConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}
