//! Streaming detection of occupied sub-bands in a spectrum sweep.
//!
//! Records come off an external sweep producer, get classified against the
//! previous cycle's noise and high power floors, and every completed cycle is
//! fanned out to subscribers.

pub mod aggregate;
pub mod args;
pub mod capture;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod exfil;
pub mod line;
pub mod monitoring;

pub use aggregate::{CycleEngine, CycleFloors, CycleReport, Detection};
pub use config::{DriverConfig, SweepConfig};
pub use driver::{DriverState, SweepDriver};
pub use error::{PublishError, SweepError};
pub use line::{parse_line, SweepLine};
