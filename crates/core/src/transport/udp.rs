use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::{Result, RtspError};

/// Largest UDP payload a media packet can occupy.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// UDP endpoint for RTP packets.
///
/// The server binds an ephemeral socket per playing session and sends
/// to the client's advertised port. The client binds its configured port
/// and receives with a short timeout so the receiving task can notice
/// when it has been told to stop.
///
/// This layer is address-only: it does not know about sessions.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound RTP.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket })
    }

    /// Bind the receiving socket on a fixed local port.
    pub fn bind_receiver(port: u16, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .map_err(|source| RtspError::PortBind { port, source })?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self { socket })
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    /// Receive one datagram. Timeouts surface as `WouldBlock`/`TimedOut`.
    pub fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.socket.recv(buf)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
        })
    }
}

/// Whether a socket error is a read timeout rather than a failure.
pub fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
