use crate::error::{Result, RtspError};
use crate::protocol::PROTOCOL_VERSION;

/// A control-channel reply (RFC 2326 §7, reduced).
///
/// Serializes to:
///
/// ```text
/// RTSP/1.0 200 OK
/// CSeq: 1
/// Session: 123456
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then
/// call [`serialize`](Self::serialize). The client side reads replies back
/// with [`parse`](Self::parse).
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
        }
    }

    /// 200 OK.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 404 NOT FOUND: the requested media file does not exist.
    pub fn not_found() -> Self {
        Self::new(404, "NOT FOUND")
    }

    /// 500 CONNECTION ERROR: the server could not set up transport.
    pub fn connection_error() -> Self {
        Self::new(500, "CONNECTION ERROR")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The echoed request sequence number.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.parse().ok())
    }

    /// The session id, if the reply carries one.
    pub fn session_id(&self) -> Option<u32> {
        self.get_header("Session")
            .and_then(|v| v.split(';').next())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Serialize to the wire format.
    pub fn serialize(&self) -> String {
        let mut response = format!(
            "{} {} {}\n",
            PROTOCOL_VERSION, self.status_code, self.status_text
        );
        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\n", name, value));
        }
        response
    }

    /// Parse a reply received on the control channel.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines().map(str::trim_end);

        let status_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| RtspError::MalformedReply("empty reply".to_string()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("RTSP/") {
            return Err(RtspError::MalformedReply(format!(
                "bad status line: {status_line}"
            )));
        }
        let status_code: u16 = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| RtspError::MalformedReply(format!("bad status code: {status_line}")))?;
        let status_text = parts.next().unwrap_or_default().trim().to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RtspError::MalformedReply(format!("bad header: {line}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(RtspResponse {
            status_code,
            status_text,
            headers,
        })
    }
}
