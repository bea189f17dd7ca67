//! Decoding of the producer's text records
//!
//! Each record looks like
//! `date, time, hz_low, hz_high, hz_bin_width, num_samples, dbm_0, ..., dbm_4`

use crate::error::SweepError;

/// Power readings carried by every record
pub const READINGS_PER_LINE: usize = 5;
/// Minimum number of comma separated fields in a record
pub const MIN_FIELDS: usize = 11;

const HZ_LOW: usize = 2;
const HZ_HIGH: usize = 3;
const HZ_BIN_WIDTH: usize = 4;
const FIRST_DBM: usize = 6;

/// One decoded sweep record
#[derive(Debug, Clone, PartialEq)]
pub struct SweepLine {
    pub low_hz: u64,
    /// Informational only, never required to parse
    pub high_hz: Option<u64>,
    pub bin_width_hz: f64,
    pub readings: [f64; READINGS_PER_LINE],
}

impl SweepLine {
    /// Absolute frequency of sub-bin `i`
    pub fn sub_bin_hz(&self, i: usize) -> u64 {
        self.low_hz + i as u64 * self.bin_width_hz.round() as u64
    }
}

pub fn parse_line(raw: &str) -> Result<SweepLine, SweepError> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(SweepError::malformed(
            raw,
            format!("{} fields, need at least {MIN_FIELDS}", fields.len()),
        ));
    }
    let low_hz = fields[HZ_LOW]
        .parse::<u64>()
        .map_err(|e| SweepError::malformed(raw, format!("hz_low: {e}")))?;
    let bin_width_hz = fields[HZ_BIN_WIDTH]
        .parse::<f64>()
        .map_err(|e| SweepError::malformed(raw, format!("hz_bin_width: {e}")))?;
    if !bin_width_hz.is_finite() || bin_width_hz < 0.0 {
        return Err(SweepError::malformed(raw, "hz_bin_width out of range"));
    }
    // The last sub-bin has to land on a representable frequency
    let last_sub_bin = (READINGS_PER_LINE - 1) as u64;
    if (bin_width_hz.round() as u64)
        .checked_mul(last_sub_bin)
        .and_then(|span| low_hz.checked_add(span))
        .is_none()
    {
        return Err(SweepError::malformed(raw, "hz_bin_width out of range"));
    }
    let mut readings = [0f64; READINGS_PER_LINE];
    for (i, reading) in readings.iter_mut().enumerate() {
        *reading = fields[FIRST_DBM + i]
            .parse()
            .map_err(|e| SweepError::malformed(raw, format!("dbm_{i}: {e}")))?;
    }
    Ok(SweepLine {
        low_hz,
        high_hz: fields[HZ_HIGH].parse().ok(),
        bin_width_hz,
        readings,
    })
}
