//! The paced, cancellable task that emits one packet per frame.
//!
//! A [`Transmission`] is an immutable snapshot taken by the control handler
//! at PLAY time: the frame store (moved in), the media socket, the
//! destination and the frame interval. The running loop never sees the
//! session record. It is stopped through a shared flag and hands the frame
//! store back when joined, so a later PLAY continues from the same frame.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::RtspError;
use crate::media::{FrameStore, Packetizer};
use crate::transport::UdpTransport;

/// Everything the loop needs, owned by the loop while it runs.
pub struct Transmission {
    pub frames: FrameStore,
    pub socket: UdpTransport,
    pub destination: SocketAddr,
    pub interval: Duration,
    pub packetizer: Box<dyn Packetizer>,
}

/// A loop that could not be started. Carries back the frame store it
/// would have consumed, still at its current position.
pub struct SpawnFailure {
    pub error: RtspError,
    pub frames: FrameStore,
}

impl fmt::Debug for SpawnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnFailure")
            .field("error", &self.error)
            .field("frame", &self.frames.frame_number())
            .finish()
    }
}

impl Transmission {
    /// Start the loop on its own thread.
    pub fn spawn(self, name: String) -> Result<TransmissionHandle, SpawnFailure> {
        self.spawn_with(thread::Builder::new().name(name))
    }

    /// The loop state is handed over only once the thread exists, so a
    /// failed spawn leaves it with the caller.
    fn spawn_with(self, builder: thread::Builder) -> Result<TransmissionHandle, SpawnFailure> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let (tx, rx) = mpsc::sync_channel::<Transmission>(1);

        let thread = match builder.spawn(move || rx.recv().ok().map(|t| t.run(&flag))) {
            Ok(thread) => thread,
            Err(e) => {
                return Err(SpawnFailure {
                    error: e.into(),
                    frames: self.frames,
                });
            }
        };

        if let Err(mpsc::SendError(transmission)) = tx.send(self) {
            return Err(SpawnFailure {
                error: RtspError::Io(io::Error::other("transmission thread exited before start")),
                frames: transmission.frames,
            });
        }
        Ok(TransmissionHandle { cancel, thread })
    }

    fn run(mut self, cancel: &AtomicBool) -> FrameStore {
        tracing::debug!(destination = %self.destination, interval = ?self.interval, "transmission started");

        let mut sent: u64 = 0;
        while !cancel.load(Ordering::SeqCst) {
            match self.frames.next_frame() {
                Some(frame) => {
                    let frame_number = self.frames.frame_number();
                    for packet in self.packetizer.packetize(frame_number, &frame) {
                        match self.socket.send_to(&packet.to_bytes(), self.destination) {
                            Ok(_) => {
                                sent += 1;
                                tracing::trace!(
                                    frame = frame_number,
                                    sequence = packet.sequence(),
                                    bytes = packet.len(),
                                    "packet sent"
                                );
                            }
                            Err(source) => {
                                let err = RtspError::Transmission {
                                    frame: frame_number,
                                    source,
                                };
                                tracing::warn!(destination = %self.destination, error = %err, "send failed");
                            }
                        }
                    }
                }
                None => {
                    let played = self.frames.frame_number();
                    tracing::debug!(frames = played, "end of stream, rewinding");
                    if let Err(e) = self.frames.reset() {
                        tracing::warn!(error = %e, "frame store rewind failed");
                    } else if played > 0 {
                        continue;
                    }
                }
            }

            thread::sleep(self.interval);
        }

        tracing::debug!(sent, frame = self.frames.frame_number(), "transmission stopped");
        self.frames
    }
}

/// Control-side handle on a running transmission loop.
pub struct TransmissionHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<Option<FrameStore>>,
}

impl TransmissionHandle {
    /// Signal the loop to stop and wait for it to exit.
    ///
    /// The loop notices the signal at its next pacing checkpoint, so this
    /// blocks for at most about one frame interval. Returns the frame store
    /// positioned after the last frame sent, or `None` if the loop panicked.
    pub fn stop(self) -> Option<FrameStore> {
        self.cancel.store(true, Ordering::SeqCst);
        match self.thread.join() {
            Ok(frames) => frames,
            Err(_) => {
                tracing::error!("transmission thread panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FrameWriter;
    use crate::media::mjpeg::MjpegPacketizer;
    use crate::media::rtp::RtpPacket;
    use std::net::UdpSocket;

    fn start(frames: &[&[u8]], interval: Duration) -> (tempfile::TempDir, UdpSocket, TransmissionHandle) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.Mjpeg");
        let mut writer = FrameWriter::create(&path).unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.finish().unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let handle = Transmission {
            frames: FrameStore::open(&path).unwrap(),
            socket: UdpTransport::bind().unwrap(),
            destination: receiver.local_addr().unwrap(),
            interval,
            packetizer: Box::new(MjpegPacketizer::default()),
        }
        .spawn("transmission-test".to_string())
        .unwrap();

        (dir, receiver, handle)
    }

    fn recv_packet(socket: &UdpSocket) -> RtpPacket {
        let mut buf = [0u8; 2048];
        let n = socket.recv(&mut buf).unwrap();
        RtpPacket::decode(&buf[..n]).unwrap()
    }

    #[test]
    fn loops_over_the_store_in_order() {
        let (_dir, receiver, handle) =
            start(&[b"one", b"two", b"three"], Duration::from_millis(5));

        let received: Vec<(u16, Vec<u8>)> = (0..5)
            .map(|_| recv_packet(&receiver))
            .map(|p| (p.sequence(), p.into_payload()))
            .collect();

        handle.stop().unwrap();

        assert_eq!(
            received,
            vec![
                (1, b"one".to_vec()),
                (2, b"two".to_vec()),
                (3, b"three".to_vec()),
                (1, b"one".to_vec()),
                (2, b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn stop_returns_store_at_current_position() {
        let (_dir, receiver, handle) = start(&[b"a", b"b", b"c", b"d"], Duration::from_millis(50));

        let first = recv_packet(&receiver);
        assert_eq!(first.sequence(), 1);

        let frames = handle.stop().unwrap();
        assert!(frames.frame_number() >= 1);
        assert!(!frames.is_closed());
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn failed_spawn_hands_back_the_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.Mjpeg");
        let mut writer = FrameWriter::create(&path).unwrap();
        for frame in [&b"one"[..], b"two", b"three"] {
            writer.write_frame(frame).unwrap();
        }
        writer.finish().unwrap();

        let mut frames = FrameStore::open(&path).unwrap();
        frames.next_frame().unwrap();

        let transmission = Transmission {
            frames,
            socket: UdpTransport::bind().unwrap(),
            destination: "127.0.0.1:9".parse().unwrap(),
            interval: Duration::from_millis(5),
            packetizer: Box::new(MjpegPacketizer::default()),
        };

        // A stack larger than the whole user address space cannot be mapped.
        let failure = transmission
            .spawn_with(thread::Builder::new().stack_size(1 << 48))
            .err()
            .expect("spawn should fail");

        assert!(matches!(failure.error, RtspError::Io(_)));
        let mut frames = failure.frames;
        assert_eq!(frames.frame_number(), 1);
        assert_eq!(frames.next_frame().unwrap(), b"two");
    }

    #[test]
    fn payload_type_is_jpeg() {
        let (_dir, receiver, handle) = start(&[b"\xFF\xD8\xFF\xD9"], Duration::from_millis(5));
        let packet = recv_packet(&receiver);
        handle.stop();
        assert_eq!(packet.payload_type(), 26);
        assert_eq!(packet.version(), 2);
    }
}
