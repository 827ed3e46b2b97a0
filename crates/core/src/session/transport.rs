/// Client-side transport info from the SETUP `Transport` header.
///
/// The client advertises the UDP port it has bound for media:
///
/// ```text
/// Transport: RTP/UDP; client_port= 25000
/// ```
///
/// RTP/AVP style ranges (`client_port=8000-8001`) are accepted too; only the
/// first (RTP) port is used since no RTCP is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client's RTP receive port.
    pub client_rtp_port: u16,
    /// Client's RTCP port, when a range was given.
    pub client_rtcp_port: Option<u16>,
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// Looks for `client_port=` among semicolon-separated parameters,
    /// tolerating whitespace on either side of the `=`.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/UDP; client_port= 25000").unwrap();
    /// assert_eq!(th.client_rtp_port, 25000);
    /// assert_eq!(th.client_rtcp_port, None);
    ///
    /// assert!(TransportHeader::parse("RTP/UDP").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        header.split(';').find_map(|part| {
            let (key, value) = part.split_once('=')?;
            if key.trim() != "client_port" {
                return None;
            }

            let mut ports = value.trim().splitn(2, '-');
            let client_rtp_port = ports.next()?.trim().parse().ok()?;
            let client_rtcp_port = match ports.next() {
                Some(rtcp) => Some(rtcp.trim().parse().ok()?),
                None => None,
            };

            Some(TransportHeader {
                client_rtp_port,
                client_rtcp_port,
            })
        })
    }

    /// Header value the client sends for a given receive port.
    pub fn for_client_port(port: u16) -> String {
        format!("RTP/UDP; client_port= {}", port)
    }
}
