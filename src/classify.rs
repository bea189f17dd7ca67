//! Threshold classification of individual readings

use std::cmp::Ordering;

use crate::{
    aggregate::{CycleAccumulator, CycleFloors, Detection},
    line::SweepLine,
};

/// Sort every reading of `line` into the candidate sets of `acc`.
///
/// Comparisons are strict: a reading sitting exactly on a floor is noise.
/// Only readings above the noise floor are eligible for the high power set.
pub fn classify(line: &SweepLine, floors: &CycleFloors, acc: &mut CycleAccumulator) {
    for (i, &power_dbm) in line.readings.iter().enumerate() {
        // A NaN on either side is unordered, never a candidate
        if power_dbm.partial_cmp(&floors.noise_floor_dbm) != Some(Ordering::Greater) {
            continue;
        }
        let detection = Detection {
            frequency_hz: line.sub_bin_hz(i),
            power_dbm,
        };
        acc.add_candidate(detection);
        if power_dbm > floors.high_power_floor_dbm {
            acc.add_high_power(detection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(readings: [f64; 5]) -> SweepLine {
        SweepLine {
            low_hz: 2_400_000_000,
            high_hz: None,
            bin_width_hz: 1_000_000.0,
            readings,
        }
    }

    #[test]
    fn test_floor_is_exclusive() {
        let mut acc = CycleAccumulator::default();
        classify(&line([-50.0; 5]), &CycleFloors::default(), &mut acc);
        assert!(acc.candidates().is_empty());
        assert!(acc.high_power_candidates().is_empty());
    }

    #[test]
    fn test_two_tier_classification() {
        let mut acc = CycleAccumulator::default();
        classify(
            &line([-70.0, -49.9, -40.0, -39.0, -80.0]),
            &CycleFloors::default(),
            &mut acc,
        );
        let freqs: Vec<u64> = acc.candidates().iter().map(|d| d.frequency_hz).collect();
        assert_eq!(freqs, [2_401_000_000, 2_402_000_000, 2_403_000_000]);
        assert_eq!(
            acc.high_power_candidates(),
            [Detection {
                frequency_hz: 2_403_000_000,
                power_dbm: -39.0
            }]
        );
    }

    #[test]
    fn test_first_sub_bin_not_special() {
        let mut acc = CycleAccumulator::default();
        classify(&line([-10.0; 5]), &CycleFloors::default(), &mut acc);
        let freqs: Vec<u64> = acc.candidates().iter().map(|d| d.frequency_hz).collect();
        assert_eq!(
            freqs,
            [
                2_400_000_000,
                2_401_000_000,
                2_402_000_000,
                2_403_000_000,
                2_404_000_000
            ]
        );
        assert_eq!(acc.high_power_candidates().len(), 5);
    }

    #[test]
    fn test_nan_floor_admits_nothing() {
        let floors = CycleFloors {
            noise_floor_dbm: f64::NAN,
            high_power_floor_dbm: -40.0,
        };
        let mut acc = CycleAccumulator::default();
        classify(&line([-90.0, -10.0, 0.0, -50.0, f64::NAN]), &floors, &mut acc);
        assert!(acc.candidates().is_empty());
        assert!(acc.high_power_candidates().is_empty());
    }

    #[test]
    fn test_high_floor_below_noise_floor() {
        // Stale high floor can sit under the noise floor, membership is still nested
        let floors = CycleFloors {
            noise_floor_dbm: -60.0,
            high_power_floor_dbm: -75.0,
        };
        let mut acc = CycleAccumulator::default();
        classify(&line([-70.0, -59.0, -80.0, -61.0, -60.0]), &floors, &mut acc);
        assert_eq!(acc.candidates().len(), 1);
        assert_eq!(acc.high_power_candidates().len(), 1);
    }
}
