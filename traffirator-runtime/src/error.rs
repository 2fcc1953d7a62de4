use thiserror::Error;
use traffirator::{PoolError, SummaryError};
use traffirator_core::ConfigError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to parse configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scenario pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Run summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Operator console task failed: {0}")]
    Console(#[from] tokio::task::JoinError),
}
