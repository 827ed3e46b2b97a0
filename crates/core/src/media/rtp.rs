use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ParseErrorKind, Result};

/// Size of the fixed RTP header in bytes.
pub const HEADER_SIZE: usize = 12;

/// RTP protocol version written by this crate.
pub const RTP_VERSION: u8 = 2;

/// The nine caller-supplied fields of the RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The timestamp is not a field here: [`RtpPacket::encode`] stamps the
/// wall clock (seconds since the epoch, low 32 bits).
///
/// `version`, `csrc_count` and `payload_type` are masked to their wire width
/// when encoded. Wider values lose their high bits silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    /// 2 bits.
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    /// 4 bits.
    pub csrc_count: u8,
    pub marker: bool,
    /// 7 bits.
    pub payload_type: u8,
    pub sequence: u16,
    pub ssrc: u32,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: 0,
            sequence: 0,
            ssrc: 0,
        }
    }
}

/// One media packet: the 12-byte header followed by a single JPEG frame.
///
/// Accessors read fields straight out of the header bytes, so a decoded
/// packet reports exactly what was on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    header: [u8; HEADER_SIZE],
    payload: Vec<u8>,
}

impl RtpPacket {
    /// Build a packet stamped with the current wall-clock time.
    pub fn encode(fields: &HeaderFields, payload: &[u8]) -> Self {
        Self::encode_with_timestamp(fields, unix_timestamp(), payload)
    }

    /// Build a packet with an explicit timestamp.
    pub fn encode_with_timestamp(fields: &HeaderFields, timestamp: u32, payload: &[u8]) -> Self {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = ((fields.version & 0x03) << 6)
            | ((fields.padding as u8) << 5)
            | ((fields.extension as u8) << 4)
            | (fields.csrc_count & 0x0F);
        header[1] = ((fields.marker as u8) << 7) | (fields.payload_type & 0x7F);
        header[2..4].copy_from_slice(&fields.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&fields.ssrc.to_be_bytes());

        Self {
            header,
            payload: payload.to_vec(),
        }
    }

    /// Split a received datagram into header and payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ParseErrorKind::TruncatedPacket(bytes.len()).into());
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);

        Ok(Self {
            header,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }

    pub fn version(&self) -> u8 {
        self.header[0] >> 6
    }

    pub fn padding(&self) -> bool {
        self.header[0] & 0x20 != 0
    }

    pub fn extension(&self) -> bool {
        self.header[0] & 0x10 != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.header[0] & 0x0F
    }

    pub fn marker(&self) -> bool {
        self.header[1] & 0x80 != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.header[1] & 0x7F
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.header[2], self.header[3]])
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([
            self.header[4],
            self.header[5],
            self.header[6],
            self.header[7],
        ])
    }

    pub fn ssrc(&self) -> u32 {
        u32::from_be_bytes([
            self.header[8],
            self.header[9],
            self.header[10],
            self.header[11],
        ])
    }

    pub fn header(&self) -> &[u8; HEADER_SIZE] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Serialize header and payload into a single datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Seconds since the Unix epoch, truncated to 32 bits.
fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_fields(sequence: u16) -> HeaderFields {
        HeaderFields {
            payload_type: 26,
            sequence,
            ssrc: 0xAABBCCDD,
            ..HeaderFields::default()
        }
    }

    #[test]
    fn version_is_2() {
        let packet = RtpPacket::encode(&jpeg_fields(1), b"jpeg");
        assert_eq!(packet.header()[0] >> 6, 2);
        assert_eq!(packet.version(), 2);
    }

    #[test]
    fn header_is_twelve_bytes() {
        let packet = RtpPacket::encode(&jpeg_fields(1), b"abc");
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(&bytes[HEADER_SIZE..], b"abc");
    }

    #[test]
    fn decode_reproduces_fields_and_payload() {
        let fields = HeaderFields {
            version: 2,
            padding: true,
            extension: false,
            csrc_count: 3,
            marker: true,
            payload_type: 26,
            sequence: 4242,
            ssrc: 0x0102_0304,
        };
        let payload = vec![0xFF, 0xD8, 0x00, 0x10, 0xFF, 0xD9];
        let sent = RtpPacket::encode_with_timestamp(&fields, 1_700_000_000, &payload);

        let received = RtpPacket::decode(&sent.to_bytes()).unwrap();
        assert_eq!(received.version(), 2);
        assert!(received.padding());
        assert!(!received.extension());
        assert_eq!(received.csrc_count(), 3);
        assert!(received.marker());
        assert_eq!(received.payload_type(), 26);
        assert_eq!(received.sequence(), 4242);
        assert_eq!(received.timestamp(), 1_700_000_000);
        assert_eq!(received.ssrc(), 0x0102_0304);
        assert_eq!(received.payload(), payload.as_slice());
        assert_eq!(received, sent);
    }

    #[test]
    fn marker_bit() {
        let mut fields = jpeg_fields(1);
        let no_marker = RtpPacket::encode(&fields, &[]);
        assert_eq!(no_marker.header()[1] & 0x80, 0);

        fields.marker = true;
        let with_marker = RtpPacket::encode(&fields, &[]);
        assert_eq!(with_marker.header()[1] & 0x80, 0x80);
        assert_eq!(with_marker.payload_type(), 26);
    }

    #[test]
    fn oversized_fields_are_masked() {
        let fields = HeaderFields {
            version: 0xFF,
            csrc_count: 0x1F,
            payload_type: 0xFF,
            ..HeaderFields::default()
        };
        let packet = RtpPacket::encode(&fields, &[]);
        assert_eq!(packet.version(), 3);
        assert_eq!(packet.csrc_count(), 0x0F);
        assert_eq!(packet.payload_type(), 0x7F);
        assert!(!packet.padding());
        assert!(!packet.marker());
    }

    #[test]
    fn timestamp_is_wall_clock_seconds() {
        let before = unix_timestamp();
        let packet = RtpPacket::encode(&jpeg_fields(7), b"x");
        let after = unix_timestamp();
        assert!(packet.timestamp() >= before && packet.timestamp() <= after);
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(RtpPacket::decode(&[0u8; 11]).is_err());
        assert!(RtpPacket::decode(&[]).is_err());
    }

    #[test]
    fn decode_header_only_has_empty_payload() {
        let packet = RtpPacket::decode(&[0x80, 26, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(packet.is_empty());
        assert_eq!(packet.sequence(), 1);
    }
}
