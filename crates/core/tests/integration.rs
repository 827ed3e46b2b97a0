//! Integration tests: a real server over loopback TCP/UDP.
//!
//! Each test writes a small frame store into a temp directory, starts the
//! server on an ephemeral port and drives it either with raw control
//! messages or with [`rtsp::Client`].

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rtsp::media::RtpPacket;
use rtsp::session::SessionState;
use rtsp::{Client, ClientConfig, FrameWriter, Server, ServerConfig};
use tempfile::TempDir;

const FRAME_RATE: u32 = 50;

struct Harness {
    _dir: TempDir,
    server: Server,
}

impl Harness {
    fn start(frame_count: usize) -> Self {
        Self::with_control_timeout(frame_count, rtsp::server::DEFAULT_CONTROL_TIMEOUT)
    }

    fn with_control_timeout(frame_count: usize, control_timeout: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let mut writer = FrameWriter::create(dir.path().join("test.stream")).unwrap();
        for i in 0..frame_count {
            writer.write_frame(format!("frame-{i}").as_bytes()).unwrap();
        }
        writer.finish().unwrap();

        let config = ServerConfig {
            media_root: dir.path().to_path_buf(),
            frame_rate: FRAME_RATE,
            control_timeout,
            ..ServerConfig::default()
        };
        let mut server = Server::with_config("127.0.0.1:0", config);
        server.start().expect("server start");

        Harness { _dir: dir, server }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr().unwrap()
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect_timeout(&self.addr(), Duration::from_secs(2))
            .expect("connect to server");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream
    }
}

fn media_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

/// Send one control message and read one reply. `None` if nothing arrives
/// before the read timeout.
fn exchange(stream: &mut TcpStream, request: &str) -> Option<String> {
    stream.write_all(request.as_bytes()).unwrap();
    let mut buf = [0u8; 1024];
    match stream.read(&mut buf) {
        Ok(0) => None,
        Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            None
        }
        Err(e) => panic!("control read failed: {e}"),
    }
}

/// Wait for the server to close the control connection.
fn assert_closed(control: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match control.read(&mut buf) {
        Ok(0) => {}
        other => panic!("expected the server to close the connection, got {other:?}"),
    }
}

fn session_id(reply: &str) -> u32 {
    reply
        .lines()
        .find_map(|l| l.strip_prefix("Session: "))
        .and_then(|v| v.trim().parse().ok())
        .expect("reply carries a session id")
}

fn setup(stream: &mut TcpStream, media: &UdpSocket, cseq: u32) -> String {
    let port = media.local_addr().unwrap().port();
    exchange(
        stream,
        &format!("SETUP test.stream RTSP/1.0\nCSeq: {cseq}\nTransport: RTP/UDP; client_port= {port}\n"),
    )
    .expect("SETUP reply")
}

fn recv_packet(media: &UdpSocket) -> Option<RtpPacket> {
    let mut buf = [0u8; 2048];
    let n = media.recv(&mut buf).ok()?;
    RtpPacket::decode(&buf[..n]).ok()
}

/// Read until the socket stays quiet for `quiet`. Returns the last packet.
fn drain(media: &UdpSocket, quiet: Duration) -> Option<RtpPacket> {
    media.set_read_timeout(Some(quiet)).unwrap();
    let mut last = None;
    while let Some(packet) = recv_packet(media) {
        last = Some(packet);
    }
    media
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    last
}

#[test]
fn setup_play_pause_resume_teardown() {
    let harness = Harness::start(500);
    let mut control = harness.connect();
    let media = media_socket();

    let reply = setup(&mut control, &media, 1);
    let id = session_id(&reply);
    assert!((100_000..=999_999).contains(&id));
    assert_eq!(reply, format!("RTSP/1.0 200 OK\nCSeq: 1\nSession: {id}\n"));

    let reply = exchange(
        &mut control,
        &format!("PLAY test.stream RTSP/1.0\nCSeq: 2\nSession: {id}\n"),
    )
    .expect("PLAY reply");
    assert_eq!(reply, format!("RTSP/1.0 200 OK\nCSeq: 2\nSession: {id}\n"));

    let first = recv_packet(&media).expect("first media packet");
    assert_eq!(first.version(), 2);
    assert_eq!(first.payload_type(), 26);
    assert_eq!(first.sequence(), 1);
    assert_eq!(first.payload(), b"frame-0");

    for expected in 2..=5u16 {
        let packet = recv_packet(&media).expect("media packet");
        assert_eq!(packet.sequence(), expected);
        assert_eq!(packet.payload(), format!("frame-{}", expected - 1).as_bytes());
    }

    let reply = exchange(
        &mut control,
        &format!("PAUSE test.stream RTSP/1.0\nCSeq: 3\nSession: {id}\n"),
    )
    .expect("PAUSE reply");
    assert!(reply.starts_with("RTSP/1.0 200 OK\nCSeq: 3\n"));

    // Everything sent before the pause reply is already queued.
    let paused_at = drain(&media, Duration::from_millis(200))
        .map(|p| p.sequence())
        .unwrap_or(5);
    let silence = drain(&media, Duration::from_millis(200));
    assert!(silence.is_none(), "media kept flowing after PAUSE");

    exchange(
        &mut control,
        &format!("PLAY test.stream RTSP/1.0\nCSeq: 4\nSession: {id}\n"),
    )
    .expect("second PLAY reply");
    let resumed = recv_packet(&media).expect("media after resume");
    assert_eq!(resumed.sequence(), paused_at + 1);

    let reply = exchange(
        &mut control,
        &format!("TEARDOWN test.stream RTSP/1.0\nCSeq: 5\nSession: {id}\n"),
    )
    .expect("TEARDOWN reply");
    assert_eq!(reply, format!("RTSP/1.0 200 OK\nCSeq: 5\nSession: {id}\n"));

    drain(&media, Duration::from_millis(200));
    assert!(drain(&media, Duration::from_millis(200)).is_none());

    // The server closes the control connection after TEARDOWN.
    assert_closed(&mut control);
}

#[test]
fn missing_resource_is_not_found() {
    let harness = Harness::start(1);
    let mut control = harness.connect();

    let reply = exchange(
        &mut control,
        "SETUP missing.stream RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port= 25000\n",
    )
    .expect("SETUP reply");
    assert_eq!(reply, "RTSP/1.0 404 NOT FOUND\nCSeq: 1\n");

    // Still in Init: a SETUP for an existing file succeeds.
    let media = media_socket();
    let reply = setup(&mut control, &media, 2);
    assert!(reply.starts_with("RTSP/1.0 200 OK\nCSeq: 2\n"));
}

#[test]
fn out_of_state_requests_get_no_reply() {
    let harness = Harness::start(10);
    let mut control = harness.connect();
    control
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();

    assert!(exchange(&mut control, "PLAY test.stream RTSP/1.0\nCSeq: 1\n").is_none());
    assert!(exchange(&mut control, "PAUSE test.stream RTSP/1.0\nCSeq: 2\n").is_none());
    assert!(exchange(&mut control, "DESCRIBE test.stream RTSP/1.0\nCSeq: 3\n").is_none());

    let media = media_socket();
    let reply = setup(&mut control, &media, 4);
    let id = session_id(&reply);

    let foreign = exchange(
        &mut control,
        &format!("PLAY test.stream RTSP/1.0\nCSeq: 5\nSession: {}\n", id + 1),
    );
    assert!(foreign.is_none());
    assert!(
        exchange(
            &mut control,
            &format!("PAUSE test.stream RTSP/1.0\nCSeq: 6\nSession: {id}\n")
        )
        .is_none()
    );
}

#[test]
fn sessions_are_independent() {
    let harness = Harness::start(10);
    let mut a = harness.connect();
    let mut b = harness.connect();
    let media_a = media_socket();
    let media_b = media_socket();

    let id_a = session_id(&setup(&mut a, &media_a, 1));
    let id_b = session_id(&setup(&mut b, &media_b, 1));
    assert_ne!(id_a, id_b);

    exchange(&mut a, &format!("PLAY test.stream RTSP/1.0\nCSeq: 2\nSession: {id_a}\n"))
        .expect("PLAY reply");
    assert_eq!(recv_packet(&media_a).expect("media for a").sequence(), 1);

    media_b
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    assert!(recv_packet(&media_b).is_none());
}

#[test]
fn client_streams_from_server() {
    let harness = Harness::start(200);

    let frames = Arc::new(AtomicU64::new(0));
    let counter = frames.clone();
    let config = ClientConfig {
        server_addr: harness.addr().to_string(),
        rtp_port: 0,
        resource: "test.stream".to_string(),
        receive_timeout: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    let mut client = Client::new(
        config,
        Arc::new(move |_: u16, jpeg: &[u8]| {
            assert!(jpeg.starts_with(b"frame-"));
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    client.setup().unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    assert!(client.session_id() >= 100_000);

    client.play().unwrap();
    assert_eq!(client.state(), SessionState::Playing);

    let deadline = Instant::now() + Duration::from_secs(3);
    while frames.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(frames.load(Ordering::SeqCst) >= 5);

    client.pause().unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    let paused = client.stats();

    client.play().unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while client.stats().frames <= paused.frames && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(client.stats().frames > paused.frames);

    client.teardown().unwrap();
    assert_eq!(client.state(), SessionState::Terminated);

    let stats = client.stats();
    assert_eq!(stats.frames, frames.load(Ordering::SeqCst));
    assert_eq!(stats.malformed, 0);
    assert!(stats.fps() > 0.0);
}

#[test]
fn stopping_the_server_closes_connections() {
    let mut harness = Harness::start(10);
    let mut control = harness.connect();
    let media = media_socket();
    setup(&mut control, &media, 1);

    harness.server.stop();
    assert!(!harness.server.is_running());

    assert_closed(&mut control);
}

#[test]
fn idle_control_connection_times_out_and_stops_media() {
    let harness = Harness::with_control_timeout(500, Duration::from_millis(400));
    let mut control = harness.connect();
    let media = media_socket();

    let id = session_id(&setup(&mut control, &media, 1));
    exchange(
        &mut control,
        &format!("PLAY test.stream RTSP/1.0\nCSeq: 2\nSession: {id}\n"),
    )
    .expect("PLAY reply");
    assert_eq!(recv_packet(&media).expect("media while playing").sequence(), 1);

    let idle_since = Instant::now();
    assert_closed(&mut control);
    assert!(idle_since.elapsed() < Duration::from_secs(2));

    // The session was released with the connection.
    drain(&media, Duration::from_millis(200));
    assert!(drain(&media, Duration::from_millis(200)).is_none());
}

#[test]
fn zero_control_timeout_keeps_connections_open() {
    let harness = Harness::with_control_timeout(10, Duration::ZERO);
    let mut control = harness.connect();
    let media = media_socket();

    let reply = setup(&mut control, &media, 1);
    let id = session_id(&reply);
    assert!(reply.starts_with("RTSP/1.0 200 OK\nCSeq: 1\n"));

    thread::sleep(Duration::from_millis(600));

    let reply = exchange(
        &mut control,
        &format!("TEARDOWN test.stream RTSP/1.0\nCSeq: 2\nSession: {id}\n"),
    )
    .expect("TEARDOWN reply after idling");
    assert!(reply.starts_with("RTSP/1.0 200 OK\nCSeq: 2\n"));
}
