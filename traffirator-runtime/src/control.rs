//! Operator console
//!
//! Lets an operator reshape an unbounded run: a number sets the target concurrency, `exit`
//! stops the run. Anything else is ignored.
use crate::error::RuntimeError;
use async_channel::{Receiver, Sender};
use std::io::{BufRead, Write};
use std::thread::JoinHandle;
use traffirator::{PoolController, PoolError, ScenarioFactory};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub const PROMPT: &str = "Write number of scenarios which should be active or 'exit':";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    SetConcurrency(usize),
    Exit,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            Some(OperatorCommand::Exit)
        } else {
            line.parse().ok().map(OperatorCommand::SetConcurrency)
        }
    }
}

/// Forward lines of `input` to `tx` from a dedicated thread.
///
/// Stops at end of input, on a read error, or once the receiving side is gone.
pub fn spawn_line_reader<R>(input: R, tx: Sender<String>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send_blocking(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Unable to read operator input: {err}");
                        break;
                    }
                }
            }
        })
}

/// Apply operator commands to `pool` until `exit`, the end of input, or the pool finishing.
pub async fn control_loop<F, W>(
    pool: PoolController<F>,
    lines: Receiver<String>,
    mut out: W,
) -> Result<(), RuntimeError>
where
    F: ScenarioFactory,
    W: Write,
{
    writeln!(out, "{PROMPT}")?;

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = pool.wait_until_finished() => {
                debug!("Scenario pool finished; closing operator console");
                return Ok(());
            }
        };

        let Ok(line) = line else {
            debug!("Operator input closed");
            return Ok(());
        };

        match OperatorCommand::parse(&line) {
            Some(OperatorCommand::Exit) => {
                info!("User requested 'exit' action");
                pool.request_stop()?;
                return Ok(());
            }
            Some(OperatorCommand::SetConcurrency(target)) => {
                match pool.set_target_concurrency(target) {
                    Ok(outcome) => {
                        if outcome.failed > 0 {
                            warn!(
                                "{} of {} new scenarios failed to start",
                                outcome.failed,
                                outcome.attempted()
                            );
                        }
                        writeln!(
                            out,
                            "Current count of active scenarios: {}",
                            pool.current_active_count()
                        )?;
                    }
                    // NOTE: Races with the pool finishing; the next iteration notices.
                    Err(err @ PoolError::InvalidState { .. }) => {
                        warn!("Ignoring concurrency change: {err}");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            None => trace!("Ignoring operator input {line:?}"),
        }
    }
}
