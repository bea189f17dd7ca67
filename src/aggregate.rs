//! Per-cycle accumulation and the lagged floor estimate
//!
//! Floors finalized at the end of one sweep cycle are what the *next* cycle
//! gets classified against. Nothing here is shared between threads, the
//! engine lives on the processing thread alone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    classify::classify,
    config::SweepConfig,
    line::{SweepLine, READINGS_PER_LINE},
};

pub const DEFAULT_NOISE_FLOOR_DBM: f64 = -50.0;
pub const DEFAULT_HIGH_POWER_FLOOR_DBM: f64 = -40.0;

/// A single sub-bin that cleared a threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub frequency_hz: u64,
    pub power_dbm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleFloors {
    pub noise_floor_dbm: f64,
    pub high_power_floor_dbm: f64,
}

impl Default for CycleFloors {
    fn default() -> Self {
        Self {
            noise_floor_dbm: DEFAULT_NOISE_FLOOR_DBM,
            high_power_floor_dbm: DEFAULT_HIGH_POWER_FLOOR_DBM,
        }
    }
}

/// Running state of the cycle in progress
#[derive(Debug, Default, Clone)]
pub struct CycleAccumulator {
    floor_sum: f64,
    floor_count: usize,
    power_sum: f64,
    power_count: usize,
    pub(crate) candidates: Vec<Detection>,
    pub(crate) high_power_candidates: Vec<Detection>,
}

impl CycleAccumulator {
    /// Non-finite readings never reach the sums
    pub fn add_floor(&mut self, readings: &[f64; READINGS_PER_LINE]) {
        for &dbm in readings.iter().filter(|r| r.is_finite()) {
            self.floor_sum += dbm;
            self.floor_count += 1;
        }
    }

    /// Record a reading above the noise floor, feeding the next high power floor
    pub fn add_candidate(&mut self, detection: Detection) {
        if detection.power_dbm.is_finite() {
            self.power_sum += detection.power_dbm;
            self.power_count += 1;
        }
        self.candidates.push(detection);
    }

    pub fn add_high_power(&mut self, detection: Detection) {
        self.high_power_candidates.push(detection);
    }

    pub fn is_empty(&self) -> bool {
        self.floor_count == 0 && self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Detection] {
        &self.candidates
    }

    pub fn high_power_candidates(&self) -> &[Detection] {
        &self.high_power_candidates
    }

    /// Floors from this cycle's sums. Empty sums, or a mean that isn't finite,
    /// keep the matching `prev` value.
    pub fn finalize(&self, prev: &CycleFloors, dbm_adjust: f64) -> CycleFloors {
        let noise_floor_dbm = mean(self.floor_sum, self.floor_count)
            .filter(|f| f.is_finite())
            .unwrap_or(prev.noise_floor_dbm);
        let high_power_floor_dbm = mean(self.power_sum, self.power_count)
            .map(|f| f + dbm_adjust)
            .filter(|f| f.is_finite())
            .unwrap_or(prev.high_power_floor_dbm);
        CycleFloors {
            noise_floor_dbm,
            high_power_floor_dbm,
        }
    }
}

fn mean(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Everything a completed cycle hands to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub completed_at: DateTime<Utc>,
    /// Floors finalized from this cycle, used for the next one
    pub floors: CycleFloors,
    pub candidates: Vec<Detection>,
    pub high_power_candidates: Vec<Detection>,
}

/// Cycle aggregator and classifier, driven one line at a time
#[derive(Debug)]
pub struct CycleEngine {
    start_hz: u64,
    dbm_adjust: f64,
    floors: CycleFloors,
    acc: CycleAccumulator,
    next_cycle: u64,
}

impl CycleEngine {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            start_hz: config.start_hz(),
            dbm_adjust: config.dbm_adjust,
            floors: CycleFloors::default(),
            acc: CycleAccumulator::default(),
            next_cycle: 0,
        }
    }

    /// Floors currently used for classification
    pub fn floors(&self) -> CycleFloors {
        self.floors
    }

    pub fn accumulator(&self) -> &CycleAccumulator {
        &self.acc
    }

    /// Feed one record. Returns the finished cycle if this record started a new one.
    pub fn ingest(&mut self, line: &SweepLine) -> Option<CycleReport> {
        let report = if line.low_hz == self.start_hz {
            self.close_cycle()
        } else {
            None
        };
        self.acc.add_floor(&line.readings);
        classify(line, &self.floors, &mut self.acc);
        report
    }

    fn close_cycle(&mut self) -> Option<CycleReport> {
        if self.acc.is_empty() {
            debug!("Cycle boundary with nothing accumulated, keeping floors");
            return None;
        }
        let acc = std::mem::take(&mut self.acc);
        self.floors = acc.finalize(&self.floors, self.dbm_adjust);
        let cycle = self.next_cycle;
        self.next_cycle += 1;
        Some(CycleReport {
            cycle,
            completed_at: Utc::now(),
            floors: self.floors,
            candidates: acc.candidates,
            high_power_candidates: acc.high_power_candidates,
        })
    }
}
