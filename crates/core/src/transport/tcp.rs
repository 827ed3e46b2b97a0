use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::protocol::{MethodHandler, Outcome, RtspRequest, split_messages};
use crate::server::ServerConfig;
use crate::transport::udp::is_timeout;

/// How often a blocked control read wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Largest control message read in one go.
const READ_BUFFER_SIZE: usize = 1024;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(listener: TcpListener, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let r = running.clone();
                let c = config.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rtsp-{peer_addr}"))
                    .spawn(move || Connection::handle(stream, c, r));
                if let Err(e) = spawned {
                    tracing::error!(%peer_addr, error = %e, "failed to spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single control connection with its own session.
struct Connection {
    stream: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
    idle_timeout: Option<Duration>,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(stream: TcpStream, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let idle_timeout = config.idle_timeout();
        let read_timeout = idle_timeout.map_or(POLL_INTERVAL, |t| POLL_INTERVAL.min(t));
        if let Err(e) = stream.set_read_timeout(Some(read_timeout)) {
            tracing::warn!(%peer_addr, error = %e, "failed to set read timeout");
            return;
        }

        let mut conn = Connection {
            stream,
            handler: MethodHandler::new(peer_addr, config.clone()),
            peer_addr,
            idle_timeout,
        };

        let reason = conn.run(&running);
        conn.handler.close();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/reply loop. Returns the reason for exiting.
    fn run(&mut self, running: &AtomicBool) -> &'static str {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut last_activity = Instant::now();

        while running.load(Ordering::SeqCst) {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return "connection closed by client",
                Ok(n) => n,
                Err(ref e) if is_timeout(e) => {
                    if let Some(timeout) = self.idle_timeout
                        && last_activity.elapsed() >= timeout
                    {
                        return "control channel timed out";
                    }
                    continue;
                }
                Err(_) => return "read error",
            };
            last_activity = Instant::now();

            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
            for message in split_messages(&chunk) {
                if !self.dispatch(message) {
                    return "write error";
                }
                if self.handler.is_terminated() {
                    return "session torn down";
                }
            }
        }

        "server shutting down"
    }

    /// Handle one message. Returns `false` if the reply could not be sent.
    fn dispatch(&mut self, message: &str) -> bool {
        let request = match RtspRequest::parse(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                return true;
            }
        };

        tracing::debug!(
            peer = %self.peer_addr,
            method = %request.method,
            uri = %request.uri,
            cseq = request.cseq,
            "request"
        );

        match self.handler.handle(&request) {
            Outcome::Reply(response) => {
                tracing::debug!(
                    peer = %self.peer_addr,
                    status = response.status_code,
                    "response"
                );
                self.stream
                    .write_all(response.serialize().as_bytes())
                    .is_ok()
            }
            Outcome::Rejected(rejection) => {
                tracing::debug!(peer = %self.peer_addr, ?rejection, "no reply sent");
                true
            }
        }
    }
}
