use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use traffirator_runtime::{demo::DemoScenarioFactory, RuntimeError, TraffiratorRuntime};

const DEFAULT_LOG_FILTER: &str = "traffirator=info,traffirator_runtime=info";

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), RuntimeError> {
    info!("****************************************");
    info!("* STARTING TRAFFIRATOR *****************");
    info!("****************************************");

    let runtime = TraffiratorRuntime::with_args()?;
    let factory = DemoScenarioFactory::new(runtime.config().demo.clone())?;
    let stats = runtime.run(factory).await?;

    info!(
        "All done: {} scenarios completed, {} failed. Good bye!",
        stats.completed, stats.failed
    );
    Ok(())
}
