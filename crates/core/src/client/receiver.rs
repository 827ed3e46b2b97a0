//! Media reception for the client side.
//!
//! The receiving task pulls datagrams off the media socket, decodes them
//! and forwards frames that are newer than the last one shown to a
//! [`FrameSink`]. Freshness is decided by a [`FreshnessPolicy`]; the
//! default, [`StrictlyIncreasing`], compares raw 16-bit sequence numbers
//! and so drops everything after the sender's counter wraps or its stream
//! loops back to frame 1.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::RtpPacket;
use crate::transport::UdpTransport;
use crate::transport::udp::is_timeout;

/// Rendering surface for accepted frames.
///
/// Called from the receiving thread once per accepted frame with the
/// packet's sequence number and the raw JPEG bytes.
pub trait FrameSink: Send + Sync {
    fn show(&self, sequence: u16, jpeg: &[u8]);
}

impl<F> FrameSink for F
where
    F: Fn(u16, &[u8]) + Send + Sync,
{
    fn show(&self, sequence: u16, jpeg: &[u8]) {
        self(sequence, jpeg)
    }
}

/// Decides whether a frame is newer than the last one displayed.
pub trait FreshnessPolicy: Send {
    /// `last` is the sequence number of the last displayed frame, 0 before
    /// the first.
    fn is_fresh(&self, last: u16, sequence: u16) -> bool;
}

/// Accept only sequence numbers strictly greater than the last one shown.
///
/// No wraparound handling: sequence 0 is never shown, and once the sender
/// passes 65535 or rewinds its stream every later frame looks old.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictlyIncreasing;

impl FreshnessPolicy for StrictlyIncreasing {
    fn is_fresh(&self, last: u16, sequence: u16) -> bool {
        sequence > last
    }
}

/// Reception counters.
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Datagrams read from the socket.
    pub packets: u64,
    /// Frames passed to the sink.
    pub frames: u64,
    /// Frames dropped as not newer than the last one shown.
    pub stale: u64,
    /// Datagrams too short to hold an RTP header.
    pub malformed: u64,
    /// Payload bytes of all decoded packets.
    pub bytes: u64,
    /// When playback first started.
    pub started: Option<Instant>,
}

impl ReceiverStats {
    pub fn mark_started(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn elapsed_secs(&self) -> Option<f64> {
        self.started
            .map(|t| t.elapsed().as_secs_f64())
            .filter(|s| *s > 0.0)
    }

    /// Average received bitrate since playback started, in kbit/s.
    pub fn bitrate_kbps(&self) -> f64 {
        self.elapsed_secs()
            .map(|s| (self.bytes * 8) as f64 / (s * 1000.0))
            .unwrap_or(0.0)
    }

    /// Average displayed frames per second since playback started.
    pub fn fps(&self) -> f64 {
        self.elapsed_secs()
            .map(|s| self.frames as f64 / s)
            .unwrap_or(0.0)
    }
}

/// Per-session reception state. Survives pause/resume: a paused client
/// keeps its last displayed sequence number.
pub struct MediaReceiver {
    policy: Box<dyn FreshnessPolicy>,
    last_sequence: u16,
    stats: Arc<Mutex<ReceiverStats>>,
}

impl MediaReceiver {
    pub fn new(policy: Box<dyn FreshnessPolicy>, stats: Arc<Mutex<ReceiverStats>>) -> Self {
        Self {
            policy,
            last_sequence: 0,
            stats,
        }
    }

    pub fn last_sequence(&self) -> u16 {
        self.last_sequence
    }

    /// Decode a datagram and decide whether its frame should be shown.
    pub fn accept(&mut self, datagram: &[u8]) -> Option<RtpPacket> {
        let mut stats = self.stats.lock();
        stats.packets += 1;

        let packet = match RtpPacket::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(error = %e, "discarding media packet");
                return None;
            }
        };
        stats.bytes += packet.payload().len() as u64;

        let sequence = packet.sequence();
        if !self.policy.is_fresh(self.last_sequence, sequence) {
            stats.stale += 1;
            tracing::trace!(sequence, last = self.last_sequence, "stale frame dropped");
            return None;
        }

        self.last_sequence = sequence;
        stats.frames += 1;
        tracing::trace!(sequence, bytes = packet.payload().len(), "frame accepted");
        Some(packet)
    }

    /// Run the receive loop on its own thread until stopped.
    pub fn spawn(
        self,
        socket: UdpTransport,
        sink: Arc<dyn FrameSink>,
        max_datagram_size: usize,
    ) -> Result<ReceiverHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("media-receiver".to_string())
            .spawn(move || self.run(&socket, sink.as_ref(), &flag, max_datagram_size))?;
        Ok(ReceiverHandle { stop, thread })
    }

    fn run(
        mut self,
        socket: &UdpTransport,
        sink: &dyn FrameSink,
        stop: &AtomicBool,
        max_datagram_size: usize,
    ) -> Self {
        let mut buf = vec![0u8; max_datagram_size];
        tracing::debug!("media receiver started");

        while !stop.load(Ordering::SeqCst) {
            match socket.recv(&mut buf) {
                Ok(n) => {
                    if let Some(packet) = self.accept(&buf[..n]) {
                        sink.show(packet.sequence(), packet.payload());
                    }
                }
                Err(ref e) if is_timeout(e) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "media receive failed, receiver exiting");
                    break;
                }
            }
        }

        tracing::debug!(last_sequence = self.last_sequence, "media receiver stopped");
        self
    }
}

/// Handle on a running receive loop.
pub struct ReceiverHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<MediaReceiver>,
}

impl ReceiverHandle {
    /// Signal the loop and wait for it. The loop checks the signal after
    /// each datagram or receive timeout.
    pub fn stop(self) -> Option<MediaReceiver> {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.join() {
            Ok(receiver) => Some(receiver),
            Err(_) => {
                tracing::error!("media receiver thread panicked");
                None
            }
        }
    }
}
