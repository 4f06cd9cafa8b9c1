//! Engine configuration.

use std::time::Duration;

use orgplane_core::downstream::OptionalStep;

/// Tuning for the ledger, provisioning and registration flows.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long terminal ledger entries are kept (default: 30 days).
    pub ledger_retention: Duration,
    /// Age after which a `processing` ledger entry is reported as stuck.
    pub ledger_stale_after: Duration,
    /// Interval between janitor sweeps.
    pub janitor_interval: Duration,
    /// How long a registration caller waits before getting "processing".
    pub registration_timeout: Duration,
    /// Slug attempts (including the bare slug) before giving up.
    pub slug_max_attempts: u32,
    /// Length of the random slug disambiguator.
    pub slug_suffix_len: usize,
    /// Capacity of the provisioning queue.
    pub queue_capacity: usize,
    /// Optional seeding steps requested from the workspace initializer.
    pub optional_steps: Vec<OptionalStep>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_retention: Duration::from_secs(30 * 24 * 3600),
            ledger_stale_after: Duration::from_secs(3600),
            janitor_interval: Duration::from_secs(3600),
            registration_timeout: Duration::from_secs(30),
            slug_max_attempts: 5,
            slug_suffix_len: 6,
            queue_capacity: 256,
            optional_steps: OptionalStep::ALL.to_vec(),
        }
    }
}
