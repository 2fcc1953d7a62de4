//! Scenario and factory contracts consumed by the pool
use std::future::Future;
use thiserror::Error;

/// One scripted sequence of protocol exchanges.
///
/// The pool runs each scenario on its own task and treats the returned future resolving as the
/// scenario's single completion, whether it succeeded or not. A panic while running counts as a
/// failed completion.
pub trait Scenario: Send + 'static {
    fn run(self) -> impl Future<Output = Result<(), ScenarioError>> + Send;
}

/// Producer of fresh [`Scenario`] instances.
///
/// Called outside the pool lock, possibly from several tasks at once.
pub trait ScenarioFactory: Send + Sync + 'static {
    type Scenario: Scenario;

    fn create(&self) -> Result<Self::Scenario, FactoryError>;
}

impl<T, S> ScenarioFactory for T
where
    T: Fn() -> Result<S, FactoryError> + Send + Sync + 'static,
    S: Scenario,
{
    type Scenario = S;

    fn create(&self) -> Result<S, FactoryError> {
        self()
    }
}

#[derive(Debug, Error)]
#[error("Unable to create scenario: {reason}")]
pub struct FactoryError {
    reason: String,
}

impl FactoryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error("Scenario failed: {0}")]
    Failed(String),

    #[error("Scenario panicked")]
    Panicked,
}

impl ScenarioError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
