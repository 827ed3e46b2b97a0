//! Client side of the control protocol.
//!
//! [`Client`] drives SETUP/PLAY/PAUSE/TEARDOWN over one control connection
//! and owns the media socket it advertised. Requests are synchronous: each
//! call sends one request and waits for one reply. A reply whose CSeq does
//! not match the request just sent, or whose status is not 200, leaves the
//! local state untouched.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtsp::client::{Client, ClientConfig};
//!
//! let config = ClientConfig::new("127.0.0.1:8554");
//! let mut client = Client::new(config, Arc::new(|seq: u16, jpeg: &[u8]| {
//!     println!("frame {seq}: {} bytes", jpeg.len());
//! }));
//! client.setup()?;
//! client.play()?;
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! client.teardown()?;
//! # Ok::<(), rtsp::RtspError>(())
//! ```

pub mod receiver;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub use receiver::{
    FrameSink, FreshnessPolicy, MediaReceiver, ReceiverHandle, ReceiverStats, StrictlyIncreasing,
};

use crate::error::{Result, RtspError};
use crate::protocol::{Method, RtspRequest, RtspResponse};
use crate::session::{SessionState, TransportHeader};
use crate::transport::UdpTransport;
use crate::transport::udp::{MAX_DATAGRAM_SIZE, is_timeout};

/// Default local port media is received on.
pub const DEFAULT_RTP_PORT: u16 = 25_000;

/// Default resource requested in SETUP.
pub const DEFAULT_RESOURCE: &str = "movie.Mjpeg";

/// Largest reply read from the control channel in one go.
const REPLY_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server control address, `host:port`.
    pub server_addr: String,
    /// Local UDP port bound for media and advertised in SETUP. 0 picks an
    /// ephemeral port.
    pub rtp_port: u16,
    /// Resource requested in every control request.
    pub resource: String,
    /// How long to wait for a control reply.
    pub reply_timeout: Duration,
    /// Read timeout of the media socket. Bounds how long the receiver takes
    /// to notice it has been stopped.
    pub receive_timeout: Duration,
    pub max_datagram_size: usize,
}

impl ClientConfig {
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8554".to_string(),
            rtp_port: DEFAULT_RTP_PORT,
            resource: DEFAULT_RESOURCE.to_string(),
            reply_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_millis(500),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

/// Control state machine of a single client session.
pub struct Client {
    config: ClientConfig,
    control: Option<TcpStream>,
    media: Option<UdpTransport>,
    state: SessionState,
    cseq: u32,
    session_id: u32,
    sink: Arc<dyn FrameSink>,
    stats: Arc<Mutex<ReceiverStats>>,
    /// Reception state while not playing.
    parked: Option<MediaReceiver>,
    /// Running receive loop while playing.
    receiving: Option<ReceiverHandle>,
}

impl Client {
    pub fn new(config: ClientConfig, sink: Arc<dyn FrameSink>) -> Self {
        Self::with_policy(config, sink, Box::new(StrictlyIncreasing))
    }

    /// Build a client with a custom frame freshness policy.
    pub fn with_policy(
        config: ClientConfig,
        sink: Arc<dyn FrameSink>,
        policy: Box<dyn FreshnessPolicy>,
    ) -> Self {
        let stats = Arc::new(Mutex::new(ReceiverStats::default()));
        Self {
            parked: Some(MediaReceiver::new(policy, stats.clone())),
            config,
            control: None,
            media: None,
            state: SessionState::Init,
            cseq: 0,
            session_id: 0,
            sink,
            stats,
            receiving: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session id assigned by the server, 0 before SETUP succeeds.
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// CSeq of the last request sent.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of the reception counters.
    pub fn stats(&self) -> ReceiverStats {
        self.stats.lock().clone()
    }

    /// Open the control connection. Called implicitly by [`setup`](Self::setup).
    pub fn connect(&mut self) -> Result<()> {
        if self.control.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.config.server_addr)?;
        stream.set_read_timeout(Some(self.config.reply_timeout))?;
        tracing::info!(server = %self.config.server_addr, "control channel connected");
        self.control = Some(stream);
        Ok(())
    }

    /// Bind the media port and request a session.
    pub fn setup(&mut self) -> Result<RtspResponse> {
        self.require(Method::Setup, &[SessionState::Init])?;
        self.connect()?;

        if self.media.is_none() {
            self.media = Some(UdpTransport::bind_receiver(
                self.config.rtp_port,
                self.config.receive_timeout,
            )?);
        }

        let reply = self.send_request(Method::Setup)?;
        if reply.is_success() {
            self.session_id = reply.session_id().ok_or_else(|| {
                RtspError::MalformedReply("SETUP reply without a session id".to_string())
            })?;
            self.transition(SessionState::Ready);
        }
        Ok(reply)
    }

    /// Start playback and the media receiver.
    ///
    /// Once the server has accepted PLAY the client is Playing, even if the
    /// local receiver then fails to start; PAUSE or TEARDOWN still apply.
    pub fn play(&mut self) -> Result<RtspResponse> {
        self.require(Method::Play, &[SessionState::Ready])?;

        let reply = self.send_request(Method::Play)?;
        if reply.is_success() {
            self.transition(SessionState::Playing);
            self.start_receiving()?;
        }
        Ok(reply)
    }

    /// Suspend playback. The receiver keeps its last displayed sequence.
    pub fn pause(&mut self) -> Result<RtspResponse> {
        self.require(Method::Pause, &[SessionState::Playing])?;

        let reply = self.send_request(Method::Pause)?;
        if reply.is_success() {
            self.stop_receiving();
            self.transition(SessionState::Ready);
        }
        Ok(reply)
    }

    /// End the session and release the media socket.
    pub fn teardown(&mut self) -> Result<RtspResponse> {
        self.require(
            Method::Teardown,
            &[SessionState::Init, SessionState::Ready, SessionState::Playing],
        )?;

        let reply = self.send_request(Method::Teardown)?;
        if reply.is_success() {
            self.stop_receiving();
            self.media = None;
            self.control = None;
            self.transition(SessionState::Terminated);
        }
        Ok(reply)
    }

    fn require(&self, method: Method, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RtspError::InvalidState {
                method,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: SessionState) {
        tracing::info!(
            session_id = self.session_id,
            from = %self.state,
            to = %to,
            "client state changed"
        );
        self.state = to;
    }

    /// Send one request and wait for its reply.
    ///
    /// Fails with `SequenceMismatch` if the reply answers a different
    /// request. Non-200 replies are returned as `Ok`.
    fn send_request(&mut self, method: Method) -> Result<RtspResponse> {
        let media_port = match &self.media {
            Some(media) => media.local_addr()?.port(),
            None => self.config.rtp_port,
        };
        let stream = self.control.as_mut().ok_or(RtspError::NotConnected)?;

        self.cseq += 1;
        let mut request = RtspRequest::new(method, &self.config.resource, self.cseq);
        request = match method {
            Method::Setup => request.add_header(
                "Transport",
                &TransportHeader::for_client_port(media_port),
            ),
            _ => request.add_header("Session", &self.session_id.to_string()),
        };

        tracing::debug!(%method, cseq = self.cseq, "sending request");
        stream.write_all(request.serialize().as_bytes())?;

        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                return Err(RtspError::ConnectionLost(
                    "control connection closed by server".to_string(),
                ));
            }
            Ok(n) => n,
            Err(ref e) if is_timeout(e) => {
                return Err(RtspError::ConnectionLost(format!(
                    "no reply to {method} within {:?}",
                    self.config.reply_timeout
                )));
            }
            Err(e) => return Err(RtspError::ConnectionLost(e.to_string())),
        };

        let reply = RtspResponse::parse(&String::from_utf8_lossy(&buf[..n]))?;
        let received = reply
            .cseq()
            .ok_or_else(|| RtspError::MalformedReply("reply without CSeq".to_string()))?;
        if received != self.cseq {
            tracing::warn!(expected = self.cseq, received, "reply sequence mismatch");
            return Err(RtspError::SequenceMismatch {
                expected: self.cseq,
                received,
            });
        }

        tracing::debug!(
            %method,
            cseq = received,
            status = reply.status_code,
            "reply received"
        );
        if !reply.is_success() {
            tracing::warn!(
                %method,
                status = reply.status_code,
                reason = %reply.status_text,
                "request refused"
            );
        }
        Ok(reply)
    }

    fn start_receiving(&mut self) -> Result<()> {
        let socket = self
            .media
            .as_ref()
            .ok_or(RtspError::NotConnected)?
            .try_clone()?;
        let receiver = match self.parked.take() {
            Some(receiver) => receiver,
            None => MediaReceiver::new(Box::new(StrictlyIncreasing), self.stats.clone()),
        };

        self.stats.lock().mark_started();
        self.receiving = Some(receiver.spawn(
            socket,
            self.sink.clone(),
            self.config.max_datagram_size,
        )?);
        Ok(())
    }

    fn stop_receiving(&mut self) {
        if let Some(handle) = self.receiving.take()
            && let Some(receiver) = handle.stop()
        {
            self.parked = Some(receiver);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop_receiving();
    }
}
