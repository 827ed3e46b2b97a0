//! Error types for the MJPEG streaming engine.

use std::fmt;

use crate::protocol::Method;
use crate::session::SessionState;

/// Errors that can occur in the streaming engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse), [`MalformedReply`](Self::MalformedReply),
///   [`SequenceMismatch`](Self::SequenceMismatch).
/// - **Media**: [`ResourceNotFound`](Self::ResourceNotFound),
///   [`FrameTooLarge`](Self::FrameTooLarge), [`Transmission`](Self::Transmission).
/// - **Transport**: [`Io`](Self::Io), [`PortBind`](Self::PortBind),
///   [`ConnectionLost`](Self::ConnectionLost), [`NotConnected`](Self::NotConnected).
/// - **Client**: [`InvalidState`](Self::InvalidState).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a control message or media packet.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The requested media file does not exist or cannot be opened.
    /// Surfaced to the peer as `404 NOT FOUND`.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The local media socket could not be bound.
    #[error("unable to bind media port {port}: {source}")]
    PortBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A control reply could not be interpreted.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// A control reply answered a different request than the one in flight.
    #[error("reply CSeq {received} does not match request CSeq {expected}")]
    SequenceMismatch { expected: u32, received: u32 },

    /// The control connection timed out or was closed by the peer.
    #[error("control connection lost: {0}")]
    ConnectionLost(String),

    /// A single media packet could not be sent. Never fatal to playback.
    #[error("failed to send frame {frame}: {source}")]
    Transmission {
        frame: u64,
        #[source]
        source: std::io::Error,
    },

    /// The client was asked to issue a request its current state does not allow.
    #[error("{method} is not valid in state {state}")]
    InvalidState { method: Method, state: SessionState },

    /// A request was issued before the control connection was opened.
    #[error("control connection not established")]
    NotConnected,

    /// A frame exceeds what the 5-digit length prefix can express.
    #[error("frame of {0} bytes exceeds the 99999 byte limit")]
    FrameTooLarge(usize),

    /// The listener was queried before
    /// [`Server::start`](crate::Server::start).
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method Resource Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The method token is not one of SETUP, PLAY, PAUSE, TEARDOWN.
    UnknownMethod(String),
    /// CSeq header absent or not a decimal integer.
    InvalidCSeq,
    /// A media packet shorter than the fixed RTP header.
    TruncatedPacket(usize),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::UnknownMethod(method) => write!(f, "unknown method {method}"),
            Self::InvalidCSeq => write!(f, "missing or invalid CSeq"),
            Self::TruncatedPacket(len) => {
                write!(f, "packet of {len} bytes is shorter than the RTP header")
            }
        }
    }
}

impl From<ParseErrorKind> for RtspError {
    fn from(kind: ParseErrorKind) -> Self {
        RtspError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
