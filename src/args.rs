//! Argument parsing for running from the command line

use std::time::Duration;

use clap::Parser;

use crate::config::{DriverConfig, SweepConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Lowest frequency to sweep, in MHz
    #[clap(long, default_value_t = 1)]
    pub min_freq: u64,
    /// Highest frequency to sweep, in MHz
    #[clap(long, default_value_t = 6000)]
    pub max_freq: u64,
    /// RF amplifier, 0 to disable, anything else enables
    #[clap(short, long, default_value_t = 1)]
    pub amp_enable: u32,
    /// LNA (IF) gain, 0-40 dB
    #[clap(short, long, default_value_t = 40)]
    pub lna_gain: u32,
    /// VGA (baseband) gain, 0-62 dB
    #[clap(short = 'g', long, default_value_t = 30)]
    pub vga_gain: u32,
    /// Width of each frequency bin in Hz
    #[clap(short = 'w', long, default_value_t = 100_000)]
    pub bin_size: u64,
    /// Added to the computed high power floor (dB)
    #[clap(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dbm_adjust: f64,
    /// Sweep producer executable
    #[clap(long, default_value = "hackrf_sweep")]
    pub sweep_bin: String,
    /// Exchange name stamped on every published cycle
    #[clap(short, long, default_value = "signalSweep")]
    pub exchange: String,
    /// Address subscribers connect to
    #[clap(short, long, default_value = "127.0.0.1:5680")]
    pub publish_addr: String,
    /// Cycles allowed to queue up for subscribers before we start dropping
    #[clap(long, default_value_t = 16)]
    pub backlog: usize,
    /// Give up if the producer is silent this long (seconds). Waits forever if unset.
    #[clap(long)]
    pub read_timeout: Option<u64>,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

impl Args {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            min_freq_mhz: self.min_freq,
            max_freq_mhz: self.max_freq,
            amp_enable: self.amp_enable >= 1,
            lna_gain: self.lna_gain,
            vga_gain: self.vga_gain,
            bin_size_hz: self.bin_size,
            dbm_adjust: self.dbm_adjust,
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            sweep_binary: self.sweep_bin.clone(),
            exchange: self.exchange.clone(),
            publish_addr: self.publish_addr.clone(),
            publish_backlog: self.backlog,
            read_timeout: self.read_timeout.map(Duration::from_secs),
        }
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
