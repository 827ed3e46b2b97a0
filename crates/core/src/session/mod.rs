//! Streaming sessions (RFC 2326 §3, reduced).
//!
//! A session tracks one streaming relationship over one control
//! connection. The server side is owned exclusively by that connection's
//! [`MethodHandler`](crate::protocol::MethodHandler); the running
//! [`Transmission`] only ever receives a snapshot plus a stop flag.
//!
//! ## Session lifecycle
//!
//! ```text
//! SETUP          Init    -> Ready
//! PLAY           Ready   -> Playing
//! PAUSE          Playing -> Ready
//! TEARDOWN       any     -> Terminated
//! control loss   any     -> Terminated (via cleanup)
//! ```

pub mod transmission;
pub mod transport;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use rand::Rng;

use crate::media::FrameStore;
pub use transmission::{SpawnFailure, Transmission, TransmissionHandle};
pub use transport::TransportHeader;

/// Range session ids are drawn from.
pub const SESSION_ID_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

/// Session state machine, shared by server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No SETUP has succeeded yet.
    #[default]
    Init,
    /// Set up and positioned, not sending.
    Ready,
    /// Media packets are flowing.
    Playing,
    /// Torn down. No further requests are accepted.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "Init",
            SessionState::Ready => "Ready",
            SessionState::Playing => "Playing",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Mint a fresh session id.
pub fn mint_session_id() -> u32 {
    rand::rng().random_range(SESSION_ID_RANGE)
}

/// Server-side record for one control connection.
///
/// Every field is read and written by the control handler only.
#[derive(Default)]
pub struct Session {
    /// Zero until SETUP succeeds; never changes afterwards.
    id: u32,
    state: SessionState,
    /// CSeq of the last request processed.
    pub last_cseq: u32,
    /// Where media packets go (`client_ip:client_port`).
    pub media_endpoint: Option<SocketAddr>,
    /// Path of the opened frame store, for reopening after a lost loop.
    pub media_path: Option<PathBuf>,
    /// Present while not playing; moved into the loop while playing.
    pub frames: Option<FrameStore>,
    /// Present exactly while playing.
    pub transmission: Option<TransmissionHandle>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Assign the session id. Only the first assignment takes effect.
    pub fn assign_id(&mut self, id: u32) {
        if self.id == 0 {
            self.id = id;
        } else {
            tracing::warn!(session_id = self.id, ignored = id, "session id already assigned");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transition to a new state.
    pub fn set_state(&mut self, state: SessionState) {
        tracing::debug!(session_id = self.id, old_state = %self.state, new_state = %state, "state transition");
        self.state = state;
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    /// Stop any running transmission and take its frame store back.
    ///
    /// Returns once the loop has exited, so the store and socket are never
    /// released while still in use.
    pub fn stop_transmission(&mut self) {
        if let Some(handle) = self.transmission.take() {
            let frames = handle.stop();
            tracing::debug!(
                session_id = self.id,
                frame = ?frames.as_ref().map(FrameStore::frame_number),
                "transmission joined"
            );
            self.frames = frames;
        }
    }

    /// Stop transmission and close the frame store.
    pub fn release(&mut self) {
        self.stop_transmission();
        if let Some(mut frames) = self.frames.take() {
            frames.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
