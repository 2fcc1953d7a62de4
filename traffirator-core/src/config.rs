use crate::{
    DEFAULT_CONNECT_WAIT, DEFAULT_DEMO_LATENCY_STD_MS, DEFAULT_DEMO_MEAN_LATENCY_MS,
    DEFAULT_DEMO_UPDATES, INFINITE_CALL_COUNT,
};
#[cfg(feature = "rt")]
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
#[cfg(feature = "rt")]
use serde_with::{serde_as, DurationSeconds};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid call count {0}; expected -1 (infinite) or a non-negative count")]
    InvalidCallCount(i64),

    #[error("Invalid concurrency {0}; expected a non-negative count")]
    InvalidConcurrency(i64),

    #[error("Invalid demo failure rate {0}; expected a value within [0, 1]")]
    InvalidFailureRate(f64),
}

/// Whether the number of scenarios started over a run is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Finite(u64),
    Infinite,
}

impl RunMode {
    pub fn is_infinite(&self) -> bool {
        matches!(self, RunMode::Infinite)
    }

    /// Scenarios which may still be started after `started` have been. `None` means unbounded.
    pub fn remaining(&self, started: u64) -> Option<u64> {
        match self {
            RunMode::Finite(total) => Some(total.saturating_sub(started)),
            RunMode::Infinite => None,
        }
    }
}

impl TryFrom<i64> for RunMode {
    type Error = ConfigError;

    fn try_from(call_count: i64) -> Result<Self, Self::Error> {
        match call_count {
            INFINITE_CALL_COUNT => Ok(RunMode::Infinite),
            n if n >= 0 => Ok(RunMode::Finite(n as u64)),
            n => Err(ConfigError::InvalidCallCount(n)),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Finite(total) => write!(f, "finite ({total} calls)"),
            RunMode::Infinite => write!(f, "infinite"),
        }
    }
}

/// Generator configuration as loaded from the YAML file.
///
/// Counts are kept signed so that the `-1` sentinel and bad values survive parsing and are
/// rejected with a proper [`ConfigError`] by [`GeneratorConfig::run_mode`] and
/// [`GeneratorConfig::initial_concurrency`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "rt", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
pub struct GeneratorConfig {
    /// Number of calls to run, `-1` for an unbounded run.
    pub call_count: i64,

    /// Initial number of concurrently active calls.
    pub concurrency: i64,

    /// Where the run summary is written. Standard output when absent.
    #[cfg_attr(feature = "rt", serde(default))]
    pub summary: Option<PathBuf>,

    #[cfg_attr(feature = "rt", serde(default = "default_connect_wait"))]
    #[cfg_attr(feature = "rt", serde_as(as = "DurationSeconds"))]
    pub connect_wait: Duration,

    /// Upper bound on the run. Once elapsed a stop is requested and active calls drain.
    #[cfg_attr(feature = "rt", serde_as(as = "Option<DurationSeconds>"))]
    pub max_duration: Option<Duration>,

    #[cfg_attr(feature = "rt", serde(default))]
    pub demo: DemoConfig,
}

#[cfg(feature = "rt")]
fn default_connect_wait() -> Duration {
    DEFAULT_CONNECT_WAIT
}

impl GeneratorConfig {
    pub fn new(call_count: i64, concurrency: i64) -> Self {
        Self {
            call_count,
            concurrency,
            summary: None,
            connect_wait: DEFAULT_CONNECT_WAIT,
            max_duration: None,
            demo: DemoConfig::default(),
        }
    }

    pub fn run_mode(&self) -> Result<RunMode, ConfigError> {
        RunMode::try_from(self.call_count)
    }

    pub fn initial_concurrency(&self) -> Result<usize, ConfigError> {
        usize::try_from(self.concurrency)
            .map_err(|_| ConfigError::InvalidConcurrency(self.concurrency))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run_mode()?;
        self.initial_concurrency()?;
        self.demo.validate()
    }
}

/// Shape of the simulated charging-control session run by the demo scenario.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "rt", serde(default))]
pub struct DemoConfig {
    /// Quota updates sent between session establishment and termination.
    pub updates: u32,
    pub mean_latency_ms: u64,
    pub latency_std_ms: u64,
    /// Probability that a single exchange is answered with an error.
    pub failure_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            updates: DEFAULT_DEMO_UPDATES,
            mean_latency_ms: DEFAULT_DEMO_MEAN_LATENCY_MS,
            latency_std_ms: DEFAULT_DEMO_LATENCY_STD_MS,
            failure_rate: 0.,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (0. ..=1.).contains(&self.failure_rate) {
            Ok(())
        } else {
            Err(ConfigError::InvalidFailureRate(self.failure_rate))
        }
    }
}
