//! Motion JPEG packetizer.
//!
//! Each stored JPEG frame travels whole in a single RTP packet. There is no
//! RFC 2435 payload header and no fragmentation: the receiver hands the
//! payload straight to a JPEG decoder.
//!
//! The sequence number is the frame store's frame number, truncated to 16
//! bits. It therefore restarts whenever the store is rewound, and a stream
//! of more than 65535 frames wraps. Receivers decide how to treat that
//! through a [`FreshnessPolicy`](crate::client::FreshnessPolicy).

use super::Packetizer;
use super::rtp::{HeaderFields, RtpPacket};

/// Static RTP payload type for JPEG (RFC 3551 §6).
pub const JPEG_PAYLOAD_TYPE: u8 = 26;

#[derive(Debug, Clone)]
pub struct MjpegPacketizer {
    payload_type: u8,
    ssrc: u32,
}

impl MjpegPacketizer {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self { payload_type, ssrc }
    }
}

impl Default for MjpegPacketizer {
    fn default() -> Self {
        Self::new(JPEG_PAYLOAD_TYPE, 0)
    }
}

impl Packetizer for MjpegPacketizer {
    fn packetize(&mut self, frame_number: u64, frame: &[u8]) -> Vec<RtpPacket> {
        let fields = HeaderFields {
            payload_type: self.payload_type,
            sequence: frame_number as u16,
            ssrc: self.ssrc,
            ..HeaderFields::default()
        };
        vec![RtpPacket::encode(&fields, frame)]
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }
}
