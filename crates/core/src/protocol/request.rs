use crate::error::{ParseErrorKind, Result};
use crate::protocol::{Method, PROTOCOL_VERSION};

/// A control-channel request (RFC 2326 §6, reduced).
///
/// ```text
/// Method SP Resource SP RTSP-Version LF
/// CSeq: n LF
/// *(Header: Value LF)
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. Both `\n` and
/// `\r\n` line endings are accepted; [`serialize`](Self::serialize)
/// always writes `\n`.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspRequest {
    pub method: Method,
    /// Resource the request targets (a frame store name or `rtsp://` URI).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Request sequence number, echoed by the reply.
    pub cseq: u32,
    /// Headers other than CSeq, as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str, cseq: u32) -> Self {
        RtspRequest {
            method,
            uri: uri.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            cseq,
            headers: Vec::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Parse a request from its text representation.
    ///
    /// Fails on an empty message, a malformed request line, an unknown
    /// method, a header without a colon, or a missing/non-numeric CSeq.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines().map(str::trim_end);

        let request_line = lines.next().ok_or(ParseErrorKind::EmptyRequest)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseErrorKind::InvalidRequestLine.into());
        }

        let method: Method = parts[0].parse()?;
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != PROTOCOL_VERSION {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut cseq: Option<u32> = None;
        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(ParseErrorKind::InvalidHeader)?;
            let name = line[..colon_pos].trim();
            let value = line[colon_pos + 1..].trim();

            if name.eq_ignore_ascii_case("CSeq") {
                cseq = Some(value.parse().map_err(|_| ParseErrorKind::InvalidCSeq)?);
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            cseq: cseq.ok_or(ParseErrorKind::InvalidCSeq)?,
            headers,
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Session id from the `Session` header, ignoring any `;timeout=`
    /// suffix.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
    }

    /// Serialize to the wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\n", self.method, self.uri, self.version);
        request.push_str(&format!("CSeq: {}\n", self.cseq));
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\n", name, value));
        }
        request
    }
}
