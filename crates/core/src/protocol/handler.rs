use std::net::SocketAddr;
use std::sync::Arc;

use crate::media::mjpeg::MjpegPacketizer;
use crate::media::{FrameStore, MediaCatalog};
use crate::protocol::Method;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::server::ServerConfig;
use crate::session::{Session, SessionState, Transmission, TransportHeader, mint_session_id};
use crate::transport::UdpTransport;

/// Result of handling one control request.
#[derive(Debug)]
pub enum Outcome {
    /// Send this reply to the client.
    Reply(RtspResponse),
    /// The request was dropped; the client gets no reply.
    Rejected(Rejection),
}

impl Outcome {
    pub fn reply(&self) -> Option<&RtspResponse> {
        match self {
            Outcome::Reply(response) => Some(response),
            Outcome::Rejected(_) => None,
        }
    }
}

/// Why a request was dropped without a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The method is not valid in the session's current state.
    WrongState { method: Method, state: SessionState },
    /// The request named a session other than the one on this connection.
    UnknownSession { expected: u32, received: String },
}

/// Server-side session state machine for a single control connection.
///
/// Owns the connection's [`Session`] outright. Transitions:
///
/// | State | Method | Next | Reply |
/// |-------|--------|------|-------|
/// | Init | SETUP | Ready | 200 + Session, 404 if the file is missing |
/// | Ready | PLAY | Playing | 200 |
/// | Playing | PAUSE | Ready | 200 |
/// | Init/Ready/Playing | TEARDOWN | Terminated | 200 |
///
/// Anything else is [`Outcome::Rejected`].
pub struct MethodHandler {
    catalog: MediaCatalog,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
    session: Session,
}

impl MethodHandler {
    pub fn new(client_addr: SocketAddr, config: Arc<ServerConfig>) -> Self {
        MethodHandler {
            catalog: MediaCatalog::new(config.media_root.clone()),
            client_addr,
            config,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.session.state() == SessionState::Terminated
    }

    pub fn handle(&mut self, request: &RtspRequest) -> Outcome {
        let cseq = request.cseq;
        let state = self.session.state();

        if let Some(rejection) = self.check_session_header(request) {
            tracing::warn!(%cseq, method = %request.method, ?rejection, "request for another session ignored");
            return Outcome::Rejected(rejection);
        }

        let response = match (request.method, state) {
            (Method::Setup, SessionState::Init) => self.handle_setup(request),
            (Method::Play, SessionState::Ready) => self.handle_play(cseq),
            (Method::Pause, SessionState::Playing) => self.handle_pause(cseq),
            (Method::Teardown, s) if s != SessionState::Terminated => self.handle_teardown(cseq),
            (method, state) => {
                tracing::warn!(%cseq, %method, %state, "request not valid in current state, ignored");
                return Outcome::Rejected(Rejection::WrongState { method, state });
            }
        };

        self.session.last_cseq = cseq;
        Outcome::Reply(response)
    }

    /// Release everything the session holds. Used when the control
    /// connection ends without a TEARDOWN.
    pub fn close(&mut self) {
        if self.is_terminated() {
            return;
        }
        let was_playing = self.session.is_playing();
        self.session.release();
        self.session.set_state(SessionState::Terminated);
        tracing::info!(session_id = self.session.id(), was_playing, "session closed without teardown");
    }

    fn check_session_header(&self, request: &RtspRequest) -> Option<Rejection> {
        let expected = self.session.id();
        if expected == 0 {
            return None;
        }
        let received = request.session_id()?;
        match received.parse::<u32>() {
            Ok(id) if id == expected => None,
            _ => Some(Rejection::UnknownSession {
                expected,
                received: received.to_string(),
            }),
        }
    }

    fn ok(&self, cseq: u32) -> RtspResponse {
        let response = RtspResponse::ok().add_header("CSeq", &cseq.to_string());
        match self.session.id() {
            0 => response,
            id => response.add_header("Session", &id.to_string()),
        }
    }

    fn handle_setup(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq;

        let transport = match request.get_header("Transport").and_then(TransportHeader::parse) {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, transport = ?request.get_header("Transport"), "SETUP without usable client_port");
                return RtspResponse::connection_error().add_header("CSeq", &cseq.to_string());
            }
        };

        let frames = match self.catalog.open(&request.uri) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(%cseq, uri = %request.uri, error = %e, "SETUP for unknown resource");
                return RtspResponse::not_found().add_header("CSeq", &cseq.to_string());
            }
        };

        let media_endpoint = SocketAddr::new(self.client_addr.ip(), transport.client_rtp_port);

        self.session.assign_id(mint_session_id());
        self.session.media_endpoint = Some(media_endpoint);
        self.session.media_path = Some(frames.path().to_path_buf());
        self.session.frames = Some(frames);
        self.session.set_state(SessionState::Ready);

        tracing::info!(
            session_id = self.session.id(),
            uri = %request.uri,
            client_rtp = %media_endpoint,
            "session created via SETUP"
        );

        self.ok(cseq)
    }

    fn handle_play(&mut self, cseq: u32) -> RtspResponse {
        let session_id = self.session.id();
        let error = || RtspResponse::connection_error().add_header("CSeq", &cseq.to_string());

        let Some(destination) = self.session.media_endpoint else {
            tracing::error!(session_id, "PLAY with no media endpoint recorded");
            return error();
        };

        let frames = match self.take_frames() {
            Some(frames) => frames,
            None => return error(),
        };

        let socket = match UdpTransport::bind() {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(session_id, error = %e, "failed to bind media socket");
                self.session.frames = Some(frames);
                return error();
            }
        };

        let transmission = Transmission {
            frames,
            socket,
            destination,
            interval: self.config.frame_interval(),
            packetizer: Box::new(MjpegPacketizer::new(
                self.config.payload_type,
                self.config.ssrc,
            )),
        };

        match transmission.spawn(format!("transmission-{session_id}")) {
            Ok(handle) => {
                self.session.transmission = Some(handle);
                self.session.set_state(SessionState::Playing);
                tracing::info!(session_id, %destination, "session started playing");
                self.ok(cseq)
            }
            Err(failure) => {
                tracing::error!(session_id, error = %failure.error, "failed to start transmission");
                self.session.frames = Some(failure.frames);
                error()
            }
        }
    }

    /// The parked frame store, reopening it if a previous loop lost it.
    fn take_frames(&mut self) -> Option<FrameStore> {
        if let Some(frames) = self.session.frames.take() {
            return Some(frames);
        }
        let path = self.session.media_path.as_ref()?;
        match FrameStore::open(path) {
            Ok(frames) => {
                tracing::warn!(session_id = self.session.id(), "frame store reopened from start");
                Some(frames)
            }
            Err(e) => {
                tracing::error!(session_id = self.session.id(), error = %e, "frame store unavailable");
                None
            }
        }
    }

    fn handle_pause(&mut self, cseq: u32) -> RtspResponse {
        self.session.stop_transmission();
        self.session.set_state(SessionState::Ready);
        tracing::info!(session_id = self.session.id(), "session paused");
        self.ok(cseq)
    }

    fn handle_teardown(&mut self, cseq: u32) -> RtspResponse {
        self.session.release();
        self.session.set_state(SessionState::Terminated);
        tracing::info!(session_id = self.session.id(), "session terminated via TEARDOWN");
        self.ok(cseq)
    }
}
