//! Simulated charging-control session
//!
//! Each scenario establishes a session, sends a configured number of quota updates and
//! terminates the session. Answers arrive after a normally distributed delay and fail with a
//! fixed probability. Stands in for a real Gx stack when exercising the generator.
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use traffirator::{FactoryError, Scenario, ScenarioError, ScenarioFactory};
use traffirator_core::{ConfigError, DemoConfig};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Initial,
    Update(u32),
    Termination,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Initial => write!(f, "CCR-I"),
            Exchange::Update(n) => write!(f, "CCR-U #{n}"),
            Exchange::Termination => write!(f, "CCR-T"),
        }
    }
}

pub struct DemoScenarioFactory {
    config: DemoConfig,
    sessions: AtomicU64,
}

impl DemoScenarioFactory {
    pub fn new(config: DemoConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: AtomicU64::new(0),
        })
    }
}

impl ScenarioFactory for DemoScenarioFactory {
    type Scenario = DemoScenario;

    fn create(&self) -> Result<DemoScenario, FactoryError> {
        let latency = Normal::new(
            self.config.mean_latency_ms as f64,
            self.config.latency_std_ms as f64,
        )
        .map_err(|err| FactoryError::new(format!("invalid latency distribution: {err}")))?;

        Ok(DemoScenario {
            session: self.sessions.fetch_add(1, Ordering::Relaxed),
            updates: self.config.updates,
            failure_rate: self.config.failure_rate,
            latency,
            rng: SmallRng::from_entropy(),
        })
    }
}

pub struct DemoScenario {
    session: u64,
    updates: u32,
    failure_rate: f64,
    latency: Normal<f64>,
    rng: SmallRng,
}

impl DemoScenario {
    pub fn exchanges(&self) -> impl Iterator<Item = Exchange> {
        std::iter::once(Exchange::Initial)
            .chain((1..=self.updates).map(Exchange::Update))
            .chain(std::iter::once(Exchange::Termination))
    }
}

impl Scenario for DemoScenario {
    async fn run(mut self) -> Result<(), ScenarioError> {
        let exchanges: Vec<_> = self.exchanges().collect();
        for exchange in exchanges {
            let delay_ms = self.latency.sample(&mut self.rng).max(0.);
            tokio::time::sleep(Duration::from_secs_f64(delay_ms / 1_000.)).await;

            if self.rng.gen_bool(self.failure_rate) {
                return Err(ScenarioError::failed(format!(
                    "session {}: {exchange} answered with DIAMETER_UNABLE_TO_COMPLY",
                    self.session
                )));
            }
            trace!("session {}: {exchange} answered", self.session);
        }
        Ok(())
    }
}
