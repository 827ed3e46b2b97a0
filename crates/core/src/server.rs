use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::mjpeg::JPEG_PAYLOAD_TYPE;
use crate::transport::tcp;

/// Default frames per second for the transmission loop.
pub const DEFAULT_FRAME_RATE: u32 = 24;

/// Default control-channel inactivity timeout.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-level configuration shared by every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory SETUP resource names are resolved against.
    pub media_root: PathBuf,
    /// Frames sent per second by each transmission loop.
    pub frame_rate: u32,
    /// A control connection idle this long is closed and its session
    /// released. Zero disables the timeout.
    pub control_timeout: Duration,
    /// RTP payload type stamped on media packets.
    pub payload_type: u8,
    /// RTP synchronization source identifier.
    pub ssrc: u32,
}

impl ServerConfig {
    /// Fixed pause between frames: `1 / frame_rate`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Control-channel idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        Some(self.control_timeout).filter(|t| !t.is_zero())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            frame_rate: DEFAULT_FRAME_RATE,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            payload_type: JPEG_PAYLOAD_TYPE,
            ssrc: 0,
        }
    }
}

/// Control-channel listener.
///
/// Accepts TCP connections and runs one
/// [`MethodHandler`](crate::protocol::MethodHandler) per connection on its
/// own thread. See [`transport::tcp`](crate::transport::tcp).
pub struct Server {
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            accept_thread: None,
            config: Arc::new(config),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let config = self.config.clone();

        tracing::info!(
            addr = %local_addr,
            media_root = %self.config.media_root.display(),
            frame_rate = self.config.frame_rate,
            "RTSP server listening"
        );

        let handle = thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || tcp::accept_loop(listener, config, running))?;
        self.accept_thread = Some(handle);

        Ok(())
    }

    /// Stop accepting connections. Open connections notice within their
    /// poll interval and release their sessions.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take()
            && handle.join().is_err()
        {
            tracing::error!("accept thread panicked");
        }
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the control listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// Returns the server's configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_from_rate() {
        let config = ServerConfig::default();
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 24);

        let zero = ServerConfig {
            frame_rate: 0,
            ..ServerConfig::default()
        };
        assert_eq!(zero.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn zero_control_timeout_disables_idle_timeout() {
        assert_eq!(
            ServerConfig::default().idle_timeout(),
            Some(DEFAULT_CONTROL_TIMEOUT)
        );

        let disabled = ServerConfig {
            control_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert_eq!(disabled.idle_timeout(), None);
    }

    #[test]
    fn start_twice_fails() {
        let mut server = Server::new("127.0.0.1:0");
        assert!(matches!(server.local_addr(), Err(RtspError::NotStarted)));
        server.start().unwrap();
        assert!(server.local_addr().unwrap().port() != 0);
        assert!(matches!(server.start(), Err(RtspError::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
    }
}
