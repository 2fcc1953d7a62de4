//! Default traffirator driver
//!
//! Runs one load generation session end to end: waits for the protocol stack to reach its peer,
//! starts the scenario pool, hands control to the operator console for unbounded runs, waits
//! for the pool to drain and writes the run summary.
use crate::{
    config::load_config,
    control::{control_loop, spawn_line_reader},
    error::RuntimeError,
};
use clap::Parser;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use traffirator::{PoolController, RunSummary, ScenarioFactory};
use traffirator_core::{GeneratorConfig, PoolStats};
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};

const CONSOLE_BUFFER: usize = 16;

#[derive(Parser, Debug)]
#[command(
    name = "traffirator",
    version,
    about = "Traffic generator for PCRF server within LTE network"
)]
struct TraffiratorCli {
    /// YAML configuration file for the generator
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
}

/// Drives a single generator run.
///
/// # Example
///
/// ```ignore
/// use traffirator_runtime::{demo::DemoScenarioFactory, TraffiratorRuntime};
///
/// #[tokio::main]
/// async fn main() {
///     let runtime = TraffiratorRuntime::with_args().unwrap();
///     let factory = DemoScenarioFactory::new(runtime.config().demo.clone()).unwrap();
///     runtime.run(factory).await.unwrap();
/// }
/// ```
pub struct TraffiratorRuntime {
    config: GeneratorConfig,
}

impl TraffiratorRuntime {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Load the configuration named by the command line.
    ///
    /// `-c`, `--config` to provide the YAML configuration file.
    pub fn with_args() -> Result<Self, RuntimeError> {
        let args = TraffiratorCli::parse();
        Ok(Self::new(load_config(&args.config)?))
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    #[instrument(name = "traffirator", skip_all, fields(call_count = self.config.call_count))]
    pub async fn run<F: ScenarioFactory>(self, factory: F) -> Result<PoolStats, RuntimeError> {
        let mode = self.config.run_mode()?;
        let initial_concurrency = self.config.initial_concurrency()?;

        let summary = Arc::new(RunSummary::new(mode, initial_concurrency));
        let pool = PoolController::new(factory, mode, initial_concurrency, summary.clone());

        info!(
            "Waiting {:?} for connection to peer...",
            self.config.connect_wait
        );
        tokio::time::sleep(self.config.connect_wait).await;
        info!("Enough waiting, lets roll");

        summary.mark_start()?;
        let outcome = pool.start()?;
        if outcome.failed > 0 {
            warn!(
                "{} of {} initial scenarios failed to start",
                outcome.failed,
                outcome.attempted()
            );
        }

        let console = if mode.is_infinite() {
            let (tx, rx) = async_channel::bounded(CONSOLE_BUFFER);
            spawn_line_reader(BufReader::new(std::io::stdin()), tx)?;
            Some(tokio::spawn(
                control_loop(pool.clone(), rx, std::io::stdout()).in_current_span(),
            ))
        } else {
            None
        };

        self.wait(&pool).await?;

        let teardown = pool.teardown();
        summary.mark_end()?;
        if let Ok(stats) = &teardown {
            summary.record_stats(*stats)?;
        }
        self.write_summary(&summary)?;

        if let Some(console) = console {
            console.await??;
        }

        Ok(teardown?)
    }

    async fn wait<F: ScenarioFactory>(&self, pool: &PoolController<F>) -> Result<(), RuntimeError> {
        let Some(max_duration) = self.config.max_duration else {
            pool.wait_until_finished().await;
            return Ok(());
        };

        if tokio::time::timeout(max_duration, pool.wait_until_finished())
            .await
            .is_err()
        {
            info!(
                "Run reached its maximum duration with {} active scenarios; draining",
                pool.current_active_count()
            );
            pool.request_stop()?;
            pool.wait_until_finished().await;
        }
        Ok(())
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<(), RuntimeError> {
        let report = summary.render();
        match &self.config.summary {
            Some(path) => {
                std::fs::write(path, report)?;
                info!("Summary written to {}", path.display());
            }
            None => {
                let mut out = std::io::stdout().lock();
                out.write_all(report.as_bytes())?;
                out.flush()?;
            }
        }
        Ok(())
    }
}
