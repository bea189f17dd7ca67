//! In this module, we implement all the monitoring logic for the sweep.
//! This is runtime stats plus the per-cycle summary that gets logged
//! whenever a sweep wraps around.

use tracing::{info, warn};

use crate::{aggregate::CycleReport, error::PublishError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    pub lines: u64,
    pub cycles: u64,
    pub candidates: u64,
    pub high_power_candidates: u64,
    pub dropped_publishes: u64,
}

impl Monitor {
    pub fn record_line(&mut self) {
        self.lines += 1;
    }

    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.candidates += report.candidates.len() as u64;
        self.high_power_candidates += report.high_power_candidates.len() as u64;
        info!(
            cycle = report.cycle,
            completed_at = %report.completed_at.to_rfc2822(),
            noise_floor_dbm = report.floors.noise_floor_dbm,
            targets = report.candidates.len(),
            high_power_floor_dbm = report.floors.high_power_floor_dbm,
            high_power_targets = report.high_power_candidates.len(),
            "Sweep cycle completed"
        );
    }

    pub fn record_publish_failure(&mut self, err: &PublishError) {
        self.dropped_publishes += 1;
        warn!(dropped = self.dropped_publishes, "Couldn't publish cycle - {err}");
    }

    /// Final tally, logged on shutdown
    pub fn summarize(&self) {
        info!(
            lines = self.lines,
            cycles = self.cycles,
            candidates = self.candidates,
            high_power_candidates = self.high_power_candidates,
            dropped_publishes = self.dropped_publishes,
            "Sweep pipeline stopped"
        );
    }
}
