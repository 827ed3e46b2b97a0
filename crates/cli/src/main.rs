use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rtsp::{Client, ClientConfig, FrameSink, FrameWriter, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mjpeg-rtsp",
    about = "MJPEG streaming over an RTSP-style control channel and RTP/UDP"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve frame store files from a media directory
    Serve {
        /// Bind address (host:port)
        #[arg(long, short, default_value = "127.0.0.1:8554")]
        bind: String,
        /// Directory resource names are resolved against
        #[arg(long, short, default_value = ".")]
        media_root: PathBuf,
        /// Frames sent per second
        #[arg(long, default_value_t = rtsp::server::DEFAULT_FRAME_RATE)]
        fps: u32,
        /// Close control connections idle for this many seconds (0 disables)
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Play a stream headlessly and report reception statistics
    Play {
        /// Server control address (host:port)
        #[arg(long, short, default_value = "127.0.0.1:8554")]
        server: String,
        /// Local UDP port to receive media on
        #[arg(long, default_value_t = rtsp::client::DEFAULT_RTP_PORT)]
        rtp_port: u16,
        /// Resource to request
        #[arg(long, short, default_value = rtsp::client::DEFAULT_RESOURCE)]
        resource: String,
        /// Seconds to play before tearing down
        #[arg(long, short, default_value_t = 10)]
        duration: u64,
        /// Write the most recent frame to this JPEG file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Pack a directory of JPEG files into a frame store
    Pack {
        /// Directory holding *.jpg / *.jpeg files, packed in name order
        dir: PathBuf,
        /// Frame store file to write
        output: PathBuf,
    },
}

/// Logs each displayed frame.
struct LogSink;

impl FrameSink for LogSink {
    fn show(&self, sequence: u16, jpeg: &[u8]) {
        tracing::debug!(sequence, bytes = jpeg.len(), "frame");
    }
}

/// Overwrites a file with the latest displayed frame.
struct FileSink {
    path: PathBuf,
}

impl FrameSink for FileSink {
    fn show(&self, sequence: u16, jpeg: &[u8]) {
        if let Err(e) = std::fs::write(&self.path, jpeg) {
            tracing::warn!(sequence, path = %self.path.display(), error = %e, "failed to write frame");
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Serve {
            bind,
            media_root,
            fps,
            timeout,
        } => serve(
            &bind,
            ServerConfig {
                media_root,
                frame_rate: fps,
                control_timeout: Duration::from_secs(timeout),
                ..ServerConfig::default()
            },
        ),
        Command::Play {
            server,
            rtp_port,
            resource,
            duration,
            output,
        } => play(
            ClientConfig {
                server_addr: server,
                rtp_port,
                resource,
                ..ClientConfig::default()
            },
            Duration::from_secs(duration),
            output,
        ),
        Command::Pack { dir, output } => pack(&dir, &output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn serve(bind: &str, config: ServerConfig) -> rtsp::Result<()> {
    let mut server = Server::with_config(bind, config);
    server.start()?;

    println!(
        "Serving MJPEG on {}, press Enter to stop",
        server.local_addr()?
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    server.stop();
    Ok(())
}

fn play(config: ClientConfig, duration: Duration, output: Option<PathBuf>) -> rtsp::Result<()> {
    let sink: Arc<dyn FrameSink> = match output {
        Some(path) => Arc::new(FileSink { path }),
        None => Arc::new(LogSink),
    };
    let mut client = Client::new(config, sink);

    let reply = client.setup()?;
    if !reply.is_success() {
        eprintln!("SETUP refused: {} {}", reply.status_code, reply.status_text);
        return Ok(());
    }
    let reply = client.play()?;
    if !reply.is_success() {
        eprintln!("PLAY refused: {} {}", reply.status_code, reply.status_text);
        client.teardown()?;
        return Ok(());
    }

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        thread::sleep(Duration::from_secs(1).min(deadline.saturating_duration_since(Instant::now())));
        let stats = client.stats();
        tracing::info!(
            frames = stats.frames,
            stale = stats.stale,
            kbps = format!("{:.1}", stats.bitrate_kbps()),
            fps = format!("{:.1}", stats.fps()),
            "receiving"
        );
    }

    client.teardown()?;

    let stats = client.stats();
    println!(
        "{} packets, {} frames shown, {} stale, {:.1} kbit/s, {:.1} fps",
        stats.packets,
        stats.frames,
        stats.stale,
        stats.bitrate_kbps(),
        stats.fps()
    );
    Ok(())
}

fn pack(dir: &Path, output: &Path) -> rtsp::Result<()> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    files.sort();

    let mut writer = FrameWriter::create(output)?;
    for file in &files {
        let jpeg = std::fs::read(file)?;
        writer.write_frame(&jpeg)?;
    }
    let frames = writer.frames();
    writer.finish()?;

    println!("Packed {frames} frames into {}", output.display());
    Ok(())
}
