//! Per-stage timing statistics
//!
//! The line budget is hard: one block of audio per line means the whole
//! precompute → render → merge → mix chain must beat B/Fs (5.3 ms at
//! 48 kHz / 256). These counters track the worst and accumulated cost of
//! each stage between telemetry emissions so a slow stage is visible in
//! the logs before it is audible as underruns.

use std::time::{Duration, Instant};

/// One stage's accumulated and worst-case duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageStat {
    total_us: u64,
    max_us: u64,
    samples: u64,
}

impl StageStat {
    pub fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.total_us += us;
        self.max_us = self.max_us.max(us);
        self.samples += 1;
    }

    pub fn mean_us(&self) -> u64 {
        if self.samples == 0 {
            0
        } else {
            self.total_us / self.samples
        }
    }

    pub fn max_us(&self) -> u64 {
        self.max_us
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The synthesis driver's per-line stage breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub precompute: StageStat,
    pub render: StageStat,
    pub merge: StageStat,
    pub mix: StageStat,
    pub line: StageStat,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time one closure into a stage selected by the caller.
    #[inline]
    pub fn time<T>(stat: &mut StageStat, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        stat.record(start.elapsed());
        out
    }

    /// Record a whole-line duration measured externally.
    pub fn record_line(&mut self, elapsed: Duration) {
        self.line.record(elapsed);
    }

    /// Emit one debug line and start a fresh window.
    pub fn log_and_reset(&mut self, budget: Duration) {
        log::debug!(
            "synth timing (budget {} us): precompute {}/{} us, render {}/{} us, \
             merge {}/{} us, mix {}/{} us, line {}/{} us (mean/max)",
            budget.as_micros(),
            self.precompute.mean_us(),
            self.precompute.max_us(),
            self.render.mean_us(),
            self.render.max_us(),
            self.merge.mean_us(),
            self.merge.max_us(),
            self.mix.mean_us(),
            self.mix.max_us(),
            self.line.mean_us(),
            self.line.max_us(),
        );
        self.precompute.reset();
        self.render.reset();
        self.merge.reset();
        self.mix.reset();
        self.line.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_tracks_mean_and_max() {
        let mut stat = StageStat::default();
        stat.record(Duration::from_micros(100));
        stat.record(Duration::from_micros(300));
        assert_eq!(stat.mean_us(), 200);
        assert_eq!(stat.max_us(), 300);
    }

    #[test]
    fn test_time_returns_closure_value() {
        let mut stat = StageStat::default();
        let v = StageTimings::time(&mut stat, || 41 + 1);
        assert_eq!(v, 42);
        assert_eq!(stat.samples, 1);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut timings = StageTimings::new();
        timings.record_line(Duration::from_micros(500));
        timings.log_and_reset(Duration::from_micros(5333));
        assert_eq!(timings.line.mean_us(), 0);
        assert_eq!(timings.line.max_us(), 0);
    }
}
