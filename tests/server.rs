//! HTTP routes against a real listener on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use auscultation_tracker::pipeline::SharedFrameBuffer;
use auscultation_tracker::pose::PixelPoint;
use auscultation_tracker::server::{self, AppState};
use auscultation_tracker::session::Session;
use auscultation_tracker::tracker::{AnatomicalTarget, ExamMode, Side};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

struct TestServer {
    addr: std::net::SocketAddr,
    session: Session,
    frames: Arc<SharedFrameBuffer<Vec<u8>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.frames.close();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let session = Session::new(ExamMode::Cardiac, 48.0);
    let frames = SharedFrameBuffer::new();
    let state = AppState {
        session: session.clone(),
        frames: Arc::clone(&frames),
        frame_wait: Duration::from_millis(50),
    };
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server::serve(listener, state, async move {
        let _ = rx.await;
    }));
    TestServer {
        addr,
        session,
        frames,
        shutdown: Some(tx),
    }
}

/// Send a bare request and read until the server closes the connection
async fn request(addr: std::net::SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(raw).unwrap();
    let status = text[9..12].parse().unwrap();
    let body = text.split_once("\r\n\r\n").unwrap().1.to_string();
    (status, body)
}

fn cardiac_targets() -> Vec<AnatomicalTarget> {
    ExamMode::Cardiac
        .target_names()
        .zip(1u32..)
        .map(|(name, ordinal)| AnatomicalTarget {
            name,
            description: "",
            position: PixelPoint::new(100 * ordinal as i32, 100),
            ordinal,
            side: Side::Left,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let server = start().await;
    let (status, body) = request(server.addr, "GET", "/health").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({"available": true, "ok": true}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_progress() {
    let server = start().await;
    let ticket = server.session.start_frame();
    server.session.observe(
        &ticket,
        &cardiac_targets(),
        &[PixelPoint::new(100, 100), PixelPoint::new(300, 100)],
    );

    let (status, body) = request(server.addr, "GET", "/status").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["mode"], "heart");
    assert_eq!(json["total"], 5);
    assert_eq!(json["done"], 2);
    assert_eq!(json["progress"], 40.0);
    assert_eq!(json["allDone"], false);
    assert_eq!(json["visited"]["Aortic"], true);
    assert_eq!(json["visited"]["Erb's Pt"], true);
    assert_eq!(json["visited"]["Mitral"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_applies_on_next_frame() {
    let server = start().await;
    let ticket = server.session.start_frame();
    server
        .session
        .observe(&ticket, &cardiac_targets(), &[PixelPoint::new(100, 100)]);

    let (status, body) = request(server.addr, "POST", "/reset").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "reset");

    server.session.start_frame();
    assert_eq!(server.session.status().done, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_route_and_wrong_method() {
    let server = start().await;
    assert_eq!(request(server.addr, "GET", "/nope").await.0, 404);
    assert_eq!(request(server.addr, "GET", "/reset").await.0, 405);
    assert_eq!(request(server.addr, "POST", "/status").await.0, 405);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_request_gets_400() {
    let server = start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"\r\n\r\n").await.unwrap();
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    assert!(raw.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

/// Read from `stream` until `needle` shows up in everything read so far
async fn read_until(stream: &mut TcpStream, seen: &mut Vec<u8>, needle: &[u8]) {
    let mut buf = [0u8; 4096];
    while !seen.windows(needle.len()).any(|w| w == needle) {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "connection closed early");
        seen.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_feed_streams_frames_and_switches_mode() {
    let server = start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /feed?mode=lung HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, b"\r\n\r\n").await;
    let head = String::from_utf8_lossy(&seen).to_string();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: multipart/x-mixed-replace; boundary=frame"));
    assert_eq!(server.session.mode(), ExamMode::Lung);

    server.frames.publish(b"JPEG-1".to_vec());
    read_until(&mut stream, &mut seen, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG-1\r\n").await;
    server.frames.publish(b"JPEG-2".to_vec());
    read_until(&mut stream, &mut seen, b"JPEG-2\r\n").await;

    // closing the buffer ends the stream
    server.frames.close();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_feed_same_mode_keeps_progress() {
    let server = start().await;
    let ticket = server.session.start_frame();
    server
        .session
        .observe(&ticket, &cardiac_targets(), &[PixelPoint::new(100, 100)]);

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /feed?mode=heart HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, b"\r\n\r\n").await;

    assert_eq!(server.session.mode(), ExamMode::Cardiac);
    assert_eq!(server.session.status().done, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_feed_ends_when_viewer_disconnects() {
    let server = start().await;
    let baseline = Arc::strong_count(&server.frames);

    for _ in 0..5 {
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /feed?mode=heart HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut seen = Vec::new();
        read_until(&mut stream, &mut seen, b"\r\n\r\n").await;
    }

    // no frame is ever published, so only the idle wakeups can notice
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while Arc::strong_count(&server.frames) > baseline {
        assert!(
            tokio::time::Instant::now() < deadline,
            "feed readers still held: {}",
            Arc::strong_count(&server.frames) - baseline
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
