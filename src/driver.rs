//! The sweep driver: owns the producer, the transport and the cycle engine,
//! and pumps records through them on the processing thread.

use std::time::Duration;

use crossbeam_channel::{after, never, select, Receiver};
use tracing::{info, warn};

use crate::{
    aggregate::CycleEngine,
    capture::Producer,
    config::SweepConfig,
    error::SweepError,
    exfil::Broadcast,
    line::parse_line,
    monitoring::Monitor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    Terminated,
}

pub struct SweepDriver<P: Producer, B: Broadcast> {
    engine: CycleEngine,
    producer: P,
    sink: B,
    lines: Receiver<String>,
    shutdown: Receiver<()>,
    read_timeout: Option<Duration>,
    state: DriverState,
    monitor: Monitor,
}

impl<P: Producer, B: Broadcast> SweepDriver<P, B> {
    pub fn new(
        config: &SweepConfig,
        producer: P,
        sink: B,
        lines: Receiver<String>,
        shutdown: Receiver<()>,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine: CycleEngine::new(config),
            producer,
            sink,
            lines,
            shutdown,
            read_timeout,
            state: DriverState::Running,
            monitor: Monitor::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn engine(&self) -> &CycleEngine {
        &self.engine
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn sink(&self) -> &B {
        &self.sink
    }

    /// Parse and ingest a single raw record, publishing the cycle it closes (if any)
    pub fn process_line(&mut self, raw: &str) -> Result<(), SweepError> {
        let line = parse_line(raw)?;
        self.monitor.record_line();
        if let Some(report) = self.engine.ingest(&line) {
            self.monitor.record_cycle(&report);
            // Publish failures are counted, ingestion carries on
            if let Err(e) = self.sink.publish(&report) {
                self.monitor.record_publish_failure(&e);
            }
        }
        Ok(())
    }

    /// Pump records until shutdown is requested (`Ok`) or something fatal happens.
    /// Either way the driver is terminated on return.
    pub fn run(&mut self) -> Result<(), SweepError> {
        if self.state == DriverState::Terminated {
            return Err(SweepError::AlreadyTerminated);
        }
        let res = self.pump();
        if let Err(e) = &res {
            warn!("Sweep pipeline failed - {e}");
        }
        self.terminate();
        res
    }

    fn pump(&mut self) -> Result<(), SweepError> {
        let lines = self.lines.clone();
        let mut shutdown = self.shutdown.clone();
        loop {
            let stall = self.read_timeout.map(after).unwrap_or_else(never);
            let mut orphaned = false;
            select! {
                recv(lines) -> msg => match msg {
                    Ok(raw) => self.process_line(&raw)?,
                    Err(_) => return Err(SweepError::ProducerExited),
                },
                recv(shutdown) -> msg => match msg {
                    Ok(()) => {
                        info!("Shutdown requested");
                        return Ok(());
                    }
                    Err(_) => orphaned = true,
                },
                recv(stall) -> _ => {
                    return Err(SweepError::ProducerStalled(
                        self.read_timeout.unwrap_or_default(),
                    ));
                }
            }
            if orphaned {
                // Nobody can ask us to stop anymore
                shutdown = never();
            }
        }
    }

    /// Stop the producer and close the transport. Idempotent.
    pub fn terminate(&mut self) {
        if self.state == DriverState::Terminated {
            return;
        }
        self.state = DriverState::Terminated;
        if let Err(e) = self.producer.stop() {
            warn!("Couldn't stop sweep producer - {e}");
        }
        self.sink.close();
        self.monitor.summarize();
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded, unbounded};

    use super::*;
    use crate::{aggregate::CycleReport, error::PublishError};

    #[derive(Default)]
    struct Stub {
        stops: usize,
    }

    impl Producer for Stub {
        fn stop(&mut self) -> std::io::Result<()> {
            self.stops += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Flaky {
        attempts: usize,
        closes: usize,
    }

    impl Broadcast for Flaky {
        fn publish(&mut self, report: &CycleReport) -> Result<(), PublishError> {
            self.attempts += 1;
            Err(PublishError::Backlogged(report.cycle))
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    const START: &str = "d, t, 1000000, 1500000, 100000, 5, -70, -70, -70, -70, -70";
    const MID: &str = "d, t, 1500000, 2000000, 100000, 5, -70, -70, -70, -70, -70";

    #[test]
    fn test_publish_failure_not_fatal() {
        let (tx, rx) = unbounded();
        for raw in [START, MID, START, MID, START] {
            tx.send(raw.to_owned()).unwrap();
        }
        let (stop_tx, stop_rx) = bounded(1);
        let mut driver = SweepDriver::new(
            &SweepConfig::default(),
            Stub::default(),
            Flaky::default(),
            rx,
            stop_rx,
            Some(Duration::from_millis(200)),
        );
        for raw in rx_drain(&driver) {
            driver.process_line(&raw).unwrap();
        }
        assert_eq!(driver.sink().attempts, 2);
        assert_eq!(driver.monitor().dropped_publishes, 2);
        assert_eq!(driver.monitor().lines, 5);

        stop_tx.send(()).unwrap();
        driver.run().unwrap();
        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(driver.producer().stops, 1);
        assert_eq!(driver.sink().closes, 1);
        assert!(matches!(driver.run(), Err(SweepError::AlreadyTerminated)));
        assert_eq!(driver.producer().stops, 1);
    }

    #[test]
    fn test_stalled_producer() {
        let (_tx, rx) = unbounded::<String>();
        let mut driver = SweepDriver::new(
            &SweepConfig::default(),
            Stub::default(),
            Flaky::default(),
            rx,
            never(),
            Some(Duration::from_millis(20)),
        );
        assert!(matches!(driver.run(), Err(SweepError::ProducerStalled(_))));
        assert_eq!(driver.producer().stops, 1);
        assert_eq!(driver.sink().closes, 1);
    }

    #[test]
    fn test_dropped_shutdown_sender_ignored() {
        let (tx, rx) = unbounded();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        drop(stop_tx);
        tx.send(START.to_owned()).unwrap();
        drop(tx);
        let mut driver = SweepDriver::new(
            &SweepConfig::default(),
            Stub::default(),
            Flaky::default(),
            rx,
            stop_rx,
            None,
        );
        assert!(matches!(driver.run(), Err(SweepError::ProducerExited)));
        assert_eq!(driver.monitor().lines, 1);
    }

    fn rx_drain<P: Producer, B: Broadcast>(driver: &SweepDriver<P, B>) -> Vec<String> {
        driver.lines.try_iter().collect()
    }
}
