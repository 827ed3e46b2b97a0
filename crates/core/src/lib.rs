pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{Client, ClientConfig, FrameSink};
pub use error::{Result, RtspError};
pub use media::{FrameStore, FrameWriter, Packetizer};
pub use server::{Server, ServerConfig};
