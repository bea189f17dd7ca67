//! This module is responsible for exfilling finished cycles to subscribers
//!
//! Wire format: plain TCP, one JSON object per cycle, newline delimited, with
//! the exchange name in an `exchange` field. This is not AMQP.
//!
//! The processing thread only ever does a non-blocking handoff into a
//! bounded channel. Socket writes happen on the exfil thread, so a slow or
//! dead subscriber can't stall ingestion.

use std::{
    io::{ErrorKind, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    aggregate::CycleReport,
    error::{PublishError, SweepError},
};

// How often the exfil thread looks for new subscribers when idle
const ACCEPT_POLL: Duration = Duration::from_millis(50);
// A subscriber that can't take a cycle in this long gets dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Fanout sink for finished cycles. No routing, every subscriber gets everything.
pub trait Broadcast {
    fn publish(&mut self, report: &CycleReport) -> Result<(), PublishError>;
    /// Release the transport. Must be safe to call more than once.
    fn close(&mut self);
}

#[derive(Serialize)]
struct Envelope<'a> {
    exchange: &'a str,
    #[serde(flatten)]
    report: &'a CycleReport,
}

/// Wire form of a cycle: one JSON object per line
pub fn encode_cycle(exchange: &str, report: &CycleReport) -> serde_json::Result<String> {
    let mut json = serde_json::to_string(&Envelope { exchange, report })?;
    json.push('\n');
    Ok(json)
}

/// TCP fanout exchange. Subscribers connect and read newline delimited JSON.
pub struct FanoutExchange {
    sender: Option<Sender<CycleReport>>,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl FanoutExchange {
    pub fn bind(addr: &str, exchange: &str, backlog: usize) -> Result<Self, SweepError> {
        let unavailable = |source| SweepError::TransportUnavailable {
            addr: addr.to_owned(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(unavailable)?;
        listener.set_nonblocking(true).map_err(unavailable)?;
        let local_addr = listener.local_addr()?;
        // A zero capacity channel would make every try_send fail
        let (sender, receiver) = bounded(backlog.max(1));
        let exchange = exchange.to_owned();
        info!(%local_addr, %exchange, "Fanout exchange listening");
        let thread = thread::Builder::new()
            .name("exfil".to_owned())
            .spawn(move || exfil_loop(listener, receiver, exchange))?;
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Broadcast for FanoutExchange {
    fn publish(&mut self, report: &CycleReport) -> Result<(), PublishError> {
        let sender = self.sender.as_ref().ok_or(PublishError::Closed)?;
        sender.try_send(report.clone()).map_err(|e| match e {
            TrySendError::Full(r) => PublishError::Backlogged(r.cycle),
            TrySendError::Disconnected(_) => PublishError::Closed,
        })
    }

    fn close(&mut self) {
        // Dropping the sender lets the exfil thread drain and exit
        if self.sender.take().is_none() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Exfil thread panicked");
            }
        }
        info!("Fanout exchange closed");
    }
}

impl Drop for FanoutExchange {
    fn drop(&mut self) {
        self.close();
    }
}

fn exfil_loop(listener: TcpListener, receiver: Receiver<CycleReport>, exchange: String) {
    let mut subscribers = Vec::new();
    loop {
        accept_pending(&listener, &mut subscribers);
        match receiver.recv_timeout(ACCEPT_POLL) {
            Ok(report) => {
                accept_pending(&listener, &mut subscribers);
                fanout(&exchange, &report, &mut subscribers);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(n = subscribers.len(), "Disconnecting subscribers");
}

fn accept_pending(listener: &TcpListener, subscribers: &mut Vec<(SocketAddr, TcpStream)>) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                // Some platforms hand back sockets inheriting the listener's mode
                if let Err(e) = stream
                    .set_nonblocking(false)
                    .and_then(|_| stream.set_write_timeout(Some(WRITE_TIMEOUT)))
                {
                    warn!(%peer, "Couldn't configure subscriber socket - {e}");
                    continue;
                }
                info!(%peer, "Subscriber connected");
                subscribers.push((peer, stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("Accepting subscriber failed - {e}");
                return;
            }
        }
    }
}

fn fanout(exchange: &str, report: &CycleReport, subscribers: &mut Vec<(SocketAddr, TcpStream)>) {
    let payload = match encode_cycle(exchange, report) {
        Ok(p) => p,
        Err(e) => {
            warn!(cycle = report.cycle, "Couldn't encode cycle - {e}");
            return;
        }
    };
    subscribers.retain_mut(|(peer, stream)| match stream.write_all(payload.as_bytes()) {
        Ok(()) => true,
        Err(e) => {
            warn!(%peer, "Dropping subscriber - {e}");
            false
        }
    });
    debug!(
        cycle = report.cycle,
        subscribers = subscribers.len(),
        "Cycle published"
    );
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read};

    use chrono::Utc;

    use super::*;
    use crate::aggregate::{CycleFloors, Detection};

    fn report(cycle: u64) -> CycleReport {
        CycleReport {
            cycle,
            completed_at: Utc::now(),
            floors: CycleFloors::default(),
            candidates: vec![Detection {
                frequency_hz: 915_000_000,
                power_dbm: -42.5,
            }],
            high_power_candidates: vec![],
        }
    }

    #[test]
    fn test_encode_cycle() {
        let line = encode_cycle("signalSweep", &report(7)).unwrap();
        assert!(line.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["exchange"], "signalSweep");
        assert_eq!(v["cycle"], 7);
        assert_eq!(v["floors"]["noise_floor_dbm"], -50.0);
        assert_eq!(v["candidates"][0]["frequency_hz"], 915_000_000u64);
        assert_eq!(v["high_power_candidates"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_loopback_fanout() {
        let mut exchange = FanoutExchange::bind("127.0.0.1:0", "signalSweep", 4).unwrap();
        let client_a = TcpStream::connect(exchange.local_addr()).unwrap();
        let client_b = TcpStream::connect(exchange.local_addr()).unwrap();
        exchange.publish(&report(0)).unwrap();
        for client in [client_a, client_b] {
            let mut reader = BufReader::new(client);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let v: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(v["cycle"], 0);
            exchange.close();
            // Socket closed after the exchange shuts down
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).unwrap();
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_publish_after_close() {
        let mut exchange = FanoutExchange::bind("127.0.0.1:0", "signalSweep", 1).unwrap();
        exchange.close();
        exchange.close();
        assert!(matches!(
            exchange.publish(&report(0)),
            Err(PublishError::Closed)
        ));
    }

    #[test]
    fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        assert!(matches!(
            FanoutExchange::bind(&addr, "signalSweep", 1),
            Err(SweepError::TransportUnavailable { .. })
        ));
    }
}
