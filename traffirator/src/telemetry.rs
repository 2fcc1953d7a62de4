#[cfg(feature = "metrics")]
use traffirator_core::PoolStats;

#[cfg(feature = "metrics")]
const ACTIVE: &str = "traffirator_active_scenarios";
#[cfg(feature = "metrics")]
const STARTED: &str = "traffirator_scenarios_started";
#[cfg(feature = "metrics")]
const COMPLETED: &str = "traffirator_scenarios_completed";
#[cfg(feature = "metrics")]
const FAILED: &str = "traffirator_scenarios_failed";

#[cfg(feature = "metrics")]
pub(crate) fn started(count: usize, stats: &PoolStats) {
    metrics::counter!(STARTED).increment(count as u64);
    metrics::gauge!(ACTIVE).set(stats.active as f64);
}

#[cfg(feature = "metrics")]
pub(crate) fn completed(failed: bool, stats: &PoolStats) {
    metrics::counter!(COMPLETED).increment(1);
    if failed {
        metrics::counter!(FAILED).increment(1);
    }
    metrics::gauge!(ACTIVE).set(stats.active as f64);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn started(_count: usize, _stats: &traffirator_core::PoolStats) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn completed(_failed: bool, _stats: &traffirator_core::PoolStats) {}
