//! Scenario concurrency control for the traffirator signaling load generator.
//!
//! A [`PoolController`] keeps a target number of [`Scenario`]s running, recycling each one as it
//! completes, until either the configured number of calls has been made or a stop is requested.
//! Every concurrency change and the run span end up in a [`RunSummary`].

pub mod error;
pub mod pool;
pub mod scenario;
pub mod summary;

mod telemetry;

pub use error::{PoolError, SummaryError};
pub use pool::{Phase, PoolController, SpawnOutcome};
pub use scenario::{FactoryError, Scenario, ScenarioError, ScenarioFactory};
pub use summary::RunSummary;

pub mod prelude {
    pub use crate::pool::PoolController;
    pub use crate::scenario::{FactoryError, Scenario, ScenarioError, ScenarioFactory};
    pub use crate::summary::RunSummary;
    pub use traffirator_core::{GeneratorConfig, PoolStats, RunMode};
}
