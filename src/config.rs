//! Sweep and driver configuration

use std::time::Duration;

use crate::error::SweepError;

/// Hardware sweep settings. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub min_freq_mhz: u64,
    pub max_freq_mhz: u64,
    pub amp_enable: bool,
    /// LNA (IF) gain, 0-40 dB
    pub lna_gain: u32,
    /// VGA (baseband) gain, 0-62 dB
    pub vga_gain: u32,
    pub bin_size_hz: u64,
    /// Offset added to every computed high power floor
    pub dbm_adjust: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_freq_mhz: 1,
            max_freq_mhz: 6000,
            amp_enable: true,
            lna_gain: 40,
            vga_gain: 30,
            bin_size_hz: 100_000,
            dbm_adjust: 0.0,
        }
    }
}

impl SweepConfig {
    pub fn validate(self) -> Result<Self, SweepError> {
        if self.min_freq_mhz >= self.max_freq_mhz {
            return Err(SweepError::InvalidConfig(format!(
                "min frequency ({} MHz) must be below max frequency ({} MHz)",
                self.min_freq_mhz, self.max_freq_mhz
            )));
        }
        if self.bin_size_hz == 0 {
            return Err(SweepError::InvalidConfig("bin size must be nonzero".into()));
        }
        Ok(self)
    }

    /// The `hz_low` every sweep cycle starts at
    pub fn start_hz(&self) -> u64 {
        self.min_freq_mhz * 1_000_000
    }

    /// Arguments for the external sweep producer
    pub fn producer_args(&self) -> Vec<String> {
        vec![
            "-g".to_owned(),
            self.vga_gain.to_string(),
            "-l".to_owned(),
            self.lna_gain.to_string(),
            "-a".to_owned(),
            u8::from(self.amp_enable).to_string(),
            "-f".to_owned(),
            format!("{}:{}", self.min_freq_mhz, self.max_freq_mhz),
            "-w".to_owned(),
            self.bin_size_hz.to_string(),
        ]
    }
}

/// Settings for the process around the sweep itself
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub sweep_binary: String,
    pub exchange: String,
    pub publish_addr: String,
    pub publish_backlog: usize,
    pub read_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sweep_binary: "hackrf_sweep".to_owned(),
            exchange: "signalSweep".to_owned(),
            publish_addr: "127.0.0.1:5680".to_owned(),
            publish_backlog: 16,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_args() {
        let args = SweepConfig::default().producer_args();
        assert_eq!(
            args,
            ["-g", "30", "-l", "40", "-a", "1", "-f", "1:6000", "-w", "100000"]
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let cfg = SweepConfig {
            min_freq_mhz: 2500,
            max_freq_mhz: 2400,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SweepError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_hz() {
        let cfg = SweepConfig {
            min_freq_mhz: 2400,
            ..Default::default()
        };
        assert_eq!(cfg.start_hz(), 2_400_000_000);
    }
}
