//! This module contains all the capture logic

// The capture thread will do one thing: pull text records off the sweep
// producer's stdout and hand them to the processing thread over a channel.
// It never looks inside a record.

use std::{
    io::{BufRead, BufReader, Read},
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::{config::SweepConfig, error::SweepError};

/// Handle to the external process generating sweep records
pub trait Producer {
    /// Stop producing. Must be safe to call more than once.
    fn stop(&mut self) -> std::io::Result<()>;
}

pub struct SweepProducer {
    child: Child,
}

impl SweepProducer {
    /// Launch the sweep binary. Returns the handle and its stdout.
    pub fn spawn(
        config: &SweepConfig,
        binary: &str,
    ) -> Result<(Self, impl Read + Send + 'static), SweepError> {
        let args = config.producer_args();
        info!(binary, ?args, "Starting sweep producer");
        let launch = |source| SweepError::ProducerLaunch {
            binary: binary.to_owned(),
            source,
        };
        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch)?;
        // Both are piped above, so these are always there
        let stdout = child.stdout.take().ok_or_else(|| {
            launch(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "producer stdout unavailable",
            ))
        })?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr)?;
        }
        Ok((Self { child }, stdout))
    }
}

impl Producer for SweepProducer {
    fn stop(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        info!(pid = self.child.id(), "Killing sweep producer");
        self.child.kill()?;
        let status = self.child.wait()?;
        debug!(%status, "Sweep producer reaped");
        Ok(())
    }
}

impl Drop for SweepProducer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// The producer chats on stderr, drain it so the pipe never fills
fn forward_stderr<R: Read + Send + 'static>(stderr: R) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("producer-stderr".to_owned())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(l) => debug!(target: "producer", "{l}"),
                    Err(_) => break,
                }
            }
        })
}

/// Forward every line from `reader` until end of stream or a read error.
/// Dropping `sender` on return is how the consumer learns the producer is gone.
pub fn capture_lines<R: BufRead>(mut reader: R, sender: Sender<String>) {
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                info!("Sweep producer output ended");
                return;
            }
            Ok(_) => {
                if sender.send(line).is_err() {
                    // Consumer hung up, nothing left to do
                    return;
                }
            }
            Err(e) => {
                warn!("Reading sweep producer failed - {e}");
                return;
            }
        }
    }
}

/// Run [`capture_lines`] on its own thread
pub fn spawn_capture<R: Read + Send + 'static>(
    reader: R,
    sender: Sender<String>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("capture".to_owned())
        .spawn(move || capture_lines(BufReader::new(reader), sender))
}
