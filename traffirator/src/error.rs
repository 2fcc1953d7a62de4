use crate::pool::Phase;
use std::sync::PoisonError;
use thiserror::Error;
use traffirator_core::ConfigError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Cannot {op} while the pool is {phase}")]
    InvalidState { op: &'static str, phase: Phase },

    #[error("Pool state mutex is poisoned.")]
    PoisonData,

    #[error("Unable to record in the run summary: {0}")]
    Summary(#[from] SummaryError),
}

impl<T> From<PoisonError<T>> for PoolError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SummaryError {
    #[error("Invalid summary state: {0}")]
    InvalidState(&'static str),

    #[error("Summary mutex is poisoned.")]
    PoisonData,
}

impl<T> From<PoisonError<T>> for SummaryError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}
