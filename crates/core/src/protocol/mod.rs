//! Control-channel protocol: a minimal RTSP dialect (RFC 2326 subset).
//!
//! Messages are plain text with `\n` line endings. Each request is sent in
//! a single write and answered by exactly one reply:
//!
//! ```text
//! SETUP movie.Mjpeg RTSP/1.0
//! CSeq: 1
//! Transport: RTP/UDP; client_port= 25000
//! ```
//!
//! ```text
//! RTSP/1.0 200 OK
//! CSeq: 1
//! Session: 123456
//! ```
//!
//! ## Supported methods
//!
//! | Method | Valid in | Effect |
//! |--------|----------|--------|
//! | SETUP | Init | Open the frame store, mint a session id |
//! | PLAY | Ready | Start the transmission loop |
//! | PAUSE | Playing | Stop the transmission loop, keep position |
//! | TEARDOWN | any | Stop everything, release resources |
//!
//! A request arriving in any other state gets no reply at all.

pub mod handler;
pub mod request;
pub mod response;

use std::fmt;
use std::str::FromStr;

use crate::error::ParseErrorKind;

pub use handler::{MethodHandler, Outcome, Rejection};
pub use request::RtspRequest;
pub use response::RtspResponse;

/// Protocol token used in request and status lines.
pub const PROTOCOL_VERSION: &str = "RTSP/1.0";

/// Control request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETUP" => Ok(Method::Setup),
            "PLAY" => Ok(Method::Play),
            "PAUSE" => Ok(Method::Pause),
            "TEARDOWN" => Ok(Method::Teardown),
            other => Err(ParseErrorKind::UnknownMethod(other.to_string())),
        }
    }
}

/// Split the text of one control-stream read into messages.
///
/// Normally a read holds exactly one message. Senders that terminate
/// messages with a blank line may have several coalesced into one read;
/// those are split apart here.
pub fn split_messages(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split("\r\n\r\n")
        .flat_map(|part| part.split("\n\n"))
        .filter(|message| !message.trim().is_empty())
}
