//! Media sources and RTP packetization.
//!
//! - [`frame_store`]: reads (and writes) the length-prefixed MJPEG file format.
//! - [`catalog`]: maps SETUP resource names onto frame store files.
//! - [`rtp`]: the 12-byte RTP fixed header codec.
//! - [`mjpeg`]: turns one stored JPEG frame into one RTP packet.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every packet carries a 12-byte fixed header ([`rtp::RtpPacket`])
//! containing:
//!
//! - **Sequence number** (16-bit): here, the frame number within the file.
//! - **Timestamp** (32-bit): wall-clock seconds at send time.
//! - **SSRC** (32-bit): configured per server.
//! - **Payload type** (7-bit): 26 (JPEG) by default.

pub mod catalog;
pub mod frame_store;
pub mod mjpeg;
pub mod rtp;

pub use catalog::MediaCatalog;
pub use frame_store::{FrameStore, FrameWriter};
pub use rtp::{HeaderFields, RtpPacket};

/// Codec-specific RTP packetizer.
///
/// The transmission loop calls [`packetize`](Self::packetize) once per
/// frame read from the store and sends every returned packet in order.
pub trait Packetizer: Send {
    /// Packetize one encoded frame. `frame_number` is the store's frame
    /// counter after the frame was read (the first frame is 1).
    fn packetize(&mut self, frame_number: u64, frame: &[u8]) -> Vec<RtpPacket>;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;
}
