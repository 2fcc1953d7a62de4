use crate::error::RuntimeError;
use std::fs::File;
use std::path::Path;
use traffirator_core::GeneratorConfig;
#[allow(unused)]
use tracing::{debug, info};

/// Load and validate the YAML generator configuration.
pub fn load_config(path: &Path) -> Result<GeneratorConfig, RuntimeError> {
    let file = File::open(path)?;
    let config: GeneratorConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    debug!("Loaded configuration from {}: {config:?}", path.display());
    Ok(config)
}
