/// Point-in-time counters of a scenario pool.
///
/// Read under the pool lock, so the fields are consistent with each other: `active` is always
/// `started - completed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub target: usize,
    pub active: usize,
    pub started: u64,
    pub completed: u64,
    /// Completions which were factory failures, scenario errors or panics.
    pub failed: u64,
}

impl PoolStats {
    pub fn succeeded(&self) -> u64 {
        self.completed - self.failed
    }
}
