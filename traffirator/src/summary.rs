//! Post-run report
//!
//! Concurrency changes are appended while the run is in flight; the report is rendered once the
//! run has ended.
use crate::error::SummaryError;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use traffirator_core::{PoolStats, RunMode};
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub wall: OffsetDateTime,
    pub instant: Instant,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            wall: OffsetDateTime::now_utc(),
            instant: Instant::now(),
        }
    }

    /// Time since `origin`, zero if this timestamp is older.
    pub fn since(&self, origin: &Timestamp) -> Duration {
        self.instant.saturating_duration_since(origin.instant)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyChange {
    pub at: Timestamp,
    pub new_target: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSpan {
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

impl RunSpan {
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.since(&start)),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct SummaryData {
    span: RunSpan,
    changes: Vec<ConcurrencyChange>,
    stats: Option<PoolStats>,
}

/// Append-only record of a run: its span, every concurrency change and the final counters.
#[derive(Debug)]
pub struct RunSummary {
    mode: RunMode,
    initial_concurrency: usize,
    data: Mutex<SummaryData>,
}

impl RunSummary {
    pub fn new(mode: RunMode, initial_concurrency: usize) -> Self {
        Self {
            mode,
            initial_concurrency,
            data: Mutex::new(SummaryData::default()),
        }
    }

    pub fn record_change(&self, new_target: usize) -> Result<(), SummaryError> {
        let change = ConcurrencyChange {
            at: Timestamp::now(),
            new_target,
        };
        self.data.lock()?.changes.push(change);
        Ok(())
    }

    pub fn mark_start(&self) -> Result<(), SummaryError> {
        let mut data = self.data.lock()?;
        if data.span.started_at.is_some() {
            return Err(SummaryError::InvalidState("run start already marked"));
        }
        data.span.started_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn mark_end(&self) -> Result<(), SummaryError> {
        let mut data = self.data.lock()?;
        if data.span.started_at.is_none() {
            return Err(SummaryError::InvalidState("run end marked before its start"));
        }
        if data.span.ended_at.is_some() {
            return Err(SummaryError::InvalidState("run end already marked"));
        }
        data.span.ended_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn record_stats(&self, stats: PoolStats) -> Result<(), SummaryError> {
        self.data.lock()?.stats = Some(stats);
        Ok(())
    }

    pub fn span(&self) -> RunSpan {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).span
    }

    pub fn changes(&self) -> Vec<ConcurrencyChange> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .changes
            .clone()
    }

    pub fn render(&self) -> String {
        let data = self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Report {
            mode: self.mode,
            initial_concurrency: self.initial_concurrency,
            data: &data,
        }
        .to_string()
    }
}

struct Report<'a> {
    mode: RunMode,
    initial_concurrency: usize,
    data: &'a SummaryData,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = &self.data.span;

        writeln!(f, "Run summary")?;
        writeln!(f, "===========")?;
        writeln!(f, "{:<22}{}", "Mode:", self.mode)?;
        writeln!(f, "{:<22}{}", "Initial concurrency:", self.initial_concurrency)?;
        writeln!(f, "{:<22}{}", "Started at:", Wall(span.started_at))?;
        writeln!(f, "{:<22}{}", "Ended at:", Wall(span.ended_at))?;
        match span.duration() {
            Some(duration) => writeln!(f, "{:<22}{}", "Duration:", Elapsed(duration))?,
            None => writeln!(f, "{:<22}-", "Duration:")?,
        }

        if let Some(stats) = &self.data.stats {
            writeln!(f, "{:<22}{}", "Scenarios started:", stats.started)?;
            writeln!(f, "{:<22}{}", "Scenarios completed:", stats.completed)?;
            writeln!(f, "{:<22}{}", "Scenarios succeeded:", stats.succeeded())?;
            writeln!(f, "{:<22}{}", "Scenarios failed:", stats.failed)?;
        }

        writeln!(f)?;
        writeln!(f, "Concurrency changes ({}):", self.data.changes.len())?;
        for change in &self.data.changes {
            let elapsed = span
                .started_at
                .map(|start| change.at.since(&start))
                .unwrap_or_default();
            writeln!(
                f,
                "  +{:<16} {}  -> {}",
                Elapsed(elapsed).to_string(),
                Wall(Some(change.at)),
                change.new_target
            )?;
        }

        Ok(())
    }
}

struct Wall(Option<Timestamp>);

impl fmt::Display for Wall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => {
                let formatted = ts.wall.format(&Rfc3339).map_err(|_| fmt::Error)?;
                f.write_str(&formatted)
            }
            None => f.write_str("-"),
        }
    }
}

/// Millisecond precision is plenty for a human-read report.
struct Elapsed(Duration);

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.as_millis() == 0 {
            return f.write_str("0s");
        }
        let millis = Duration::from_millis(self.0.as_millis() as u64);
        write!(f, "{}", humantime::format_duration(millis))
    }
}
