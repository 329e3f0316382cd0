//! Recognized configuration options (spec §6). No file or CLI parsing
//! here — that's explicitly out of scope; this is just the typed,
//! `Default`-able bag of knobs the instance and shell read from.
//!
//! Struct layout grounded in `jo-goro-swimmers`'s `Config`/`PingConfig`/
//! `SuspicionConfig` (a plain nested-struct config, no derive(Deserialize)
//! since nothing loads it from a file in this core).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SwimConfig {
    /// Base interval between periodic probes.
    pub probe_interval: Duration,
    /// Base direct-probe timeout.
    pub ping_timeout: Duration,
    /// `k`: number of helper members used for indirect probing.
    pub indirect_checks: usize,
    /// `lambda` in the gossip dissemination-count formula.
    pub gossip_fanout_lambda: f64,
    /// Gossip payload bounds.
    pub max_gossip_bytes: usize,
    pub max_gossip_facts: usize,
    /// Local health multiplier ceiling.
    pub lhm_max: u32,
    /// Suspicion timeout bounds, in units of `probe_interval`.
    pub min_suspicion_timeout_multiplier: f64,
    pub max_suspicion_timeout_multiplier: f64,
    /// Cap on suspecter-count used in the suspicion timeout formula.
    pub suspicion_max_independent_suspicions: u32,
    /// Minimum retained duration for `Dead` tombstones before GC is
    /// permitted (never enforced automatically by the core; a caller-run
    /// sweep decides when to actually drop them).
    pub tombstone_ttl: Duration,
}

impl Default for SwimConfig {
    fn default() -> Self {
        SwimConfig {
            probe_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_millis(300),
            indirect_checks: 3,
            gossip_fanout_lambda: 3.0,
            max_gossip_bytes: 1400,
            max_gossip_facts: 10,
            lhm_max: 8,
            min_suspicion_timeout_multiplier: 3.0,
            max_suspicion_timeout_multiplier: 10.0,
            suspicion_max_independent_suspicions: 3,
            tombstone_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SwimConfig {
    pub fn min_suspicion_timeout(&self) -> Duration {
        self.probe_interval.mul_f64(self.min_suspicion_timeout_multiplier)
    }

    pub fn max_suspicion_timeout(&self) -> Duration {
        self.probe_interval.mul_f64(self.max_suspicion_timeout_multiplier)
    }
}
