use std::time::Duration;

/// Call count which selects an unbounded run.
pub const INFINITE_CALL_COUNT: i64 = -1;

/// Grace period given to the protocol stack to reach its peer before the run starts.
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(5);

pub const DEFAULT_DEMO_UPDATES: u32 = 3;
pub const DEFAULT_DEMO_MEAN_LATENCY_MS: u64 = 20;
pub const DEFAULT_DEMO_LATENCY_STD_MS: u64 = 5;
