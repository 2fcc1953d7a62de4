pub mod config;
pub mod control;
pub mod demo;
pub mod runtime;

mod error;

pub use crate::error::RuntimeError;
pub use crate::runtime::TraffiratorRuntime;
