//! HTTP front end: MJPEG feed plus the status/reset/health JSON routes.
//!
//! Each connection gets its own tokio task and its own [`FrameReader`], so a
//! stalled or vanished client never affects the producer or other clients.

pub mod http;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

use self::http::HttpRequest;
use crate::pipeline::{SharedFrameBuffer, WaitOutcome};
use crate::session::Session;
use crate::tracker::ExamMode;

pub struct AppState<T> {
    pub session: Session,
    pub frames: Arc<SharedFrameBuffer<T>>,
    /// Per-wait timeout of feed clients
    pub frame_wait: Duration,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            frames: Arc::clone(&self.frames),
            frame_wait: self.frame_wait,
        }
    }
}

/// Accept connections until `shutdown` resolves. Open feeds end on their own
/// once the frame buffer is closed.
pub async fn serve<T, F>(listener: TcpListener, state: AppState<T>, shutdown: F) -> Result<()>
where
    T: AsRef<[u8]> + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    info!("[http] listening on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("[http] shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("[http] accept failed: {e}");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &state).await {
                        debug!("[http] {peer}: {e:#}");
                    }
                });
            }
        }
    }
    Ok(())
}

async fn handle_connection<T>(mut stream: TcpStream, state: &AppState<T>) -> Result<()>
where
    T: AsRef<[u8]> + Send + Sync + 'static,
{
    stream.set_nodelay(true)?;
    let request = match http::read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            http::write_json(&mut stream, 400, &json!({"error": "bad_request"})).await?;
            return Err(e);
        }
    };
    debug!("[http] {} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            http::write_json(&mut stream, 200, &json!({"available": true, "ok": true})).await
        }
        ("GET", "/status") => http::write_json(&mut stream, 200, &state.session.status()).await,
        ("POST", "/reset") => {
            state.session.request_reset();
            http::write_json(&mut stream, 200, &json!({"status": "reset"})).await
        }
        ("GET", "/feed") => stream_feed(stream, state, &request).await,
        (_, "/health" | "/status" | "/reset" | "/feed") => {
            http::write_json(&mut stream, 405, &json!({"error": "method_not_allowed"})).await
        }
        _ => http::write_json(&mut stream, 404, &json!({"error": "not_found"})).await,
    }
}

/// `?mode=` missing or unrecognised means heart, matching the feed's default.
fn requested_mode(request: &HttpRequest) -> ExamMode {
    match request.query_param("mode") {
        None => ExamMode::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("[http] {e}, using {}", ExamMode::default());
            ExamMode::default()
        }),
    }
}

async fn stream_feed<T>(mut stream: TcpStream, state: &AppState<T>, request: &HttpRequest) -> Result<()>
where
    T: AsRef<[u8]> + Send + Sync + 'static,
{
    state.session.switch_mode(requested_mode(request));
    http::write_stream_head(&mut stream).await?;

    let mut reader = state.frames.reader();
    let wait = state.frame_wait;
    loop {
        let (outcome, returned) = tokio::task::spawn_blocking(move || {
            let outcome = reader.wait_next(wait);
            (outcome, reader)
        })
        .await?;
        reader = returned;

        match outcome {
            WaitOutcome::Frame(published) => {
                let jpeg: &[u8] = (*published.frame).as_ref();
                http::write_jpeg_part(&mut stream, jpeg).await?;
            }
            WaitOutcome::Timeout => {
                if peer_gone(&stream) {
                    debug!("[http] feed client went away while idle");
                    break;
                }
            }
            WaitOutcome::Closed => break,
        }
    }
    debug!("[http] feed ended after frame {}", reader.last_seen());
    Ok(())
}

/// Non-blocking EOF check. Feed clients never send after the request, so any
/// readable byte is ignored; only EOF or a socket error counts as gone.
fn peer_gone(stream: &TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match stream.try_read(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}
