//! Just enough HTTP/1.1 for the tracker routes: one request per connection,
//! no bodies read, `Connection: close` on every response.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Multipart boundary of the MJPEG feed
pub const BOUNDARY: &str = "frame";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

impl HttpRequest {
    /// First value of `key` in the query string, undecoded.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .as_deref()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// Parse the request line of a header block. Headers are not needed by any
/// route and are skipped.
pub fn parse_request(data: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(data);
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let target = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
    })
}

pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<HttpRequest> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf))
            .await
            .context("request read timed out")??;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            bail!("request too large");
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request(&data)
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    stream: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        status_line(status),
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn write_json<W: AsyncWrite + Unpin, B: Serialize + ?Sized>(
    stream: &mut W,
    status: u16,
    body: &B,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload).await
}

/// Response head of an endless `multipart/x-mixed-replace` stream
pub async fn write_stream_head<W: AsyncWrite + Unpin>(stream: &mut W) -> Result<()> {
    let header = format!(
        "{}\r\nContent-Type: multipart/x-mixed-replace; boundary={BOUNDARY}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        status_line(200)
    );
    stream.write_all(header.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn write_jpeg_part<W: AsyncWrite + Unpin>(stream: &mut W, jpeg: &[u8]) -> Result<()> {
    let head = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(jpeg).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let req = parse_request(b"GET /feed?mode=lung&x=1 HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/feed");
        assert_eq!(req.query_param("mode"), Some("lung"));
        assert_eq!(req.query_param("x"), Some("1"));
        assert_eq!(req.query_param("y"), None);
    }

    #[test]
    fn test_parse_without_query() {
        let req = parse_request(b"POST /reset HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/reset");
        assert!(req.query.is_none());
        assert_eq!(req.query_param("mode"), None);
    }

    #[test]
    fn test_bare_query_key() {
        let req = parse_request(b"GET /feed?mode HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query_param("mode"), Some(""));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_request(b"").is_err());
        assert!(parse_request(b"GET\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn test_read_request_rejects_oversized() {
        let mut data = b"GET /".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_REQUEST_BYTES + 10));
        let mut reader: &[u8] = &data;
        assert!(read_request(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_jpeg_part_framing() {
        let mut out = Vec::new();
        write_jpeg_part(&mut out, b"JPEG").await.unwrap();
        assert_eq!(out, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n");
    }

    #[tokio::test]
    async fn test_json_response_head() {
        let mut out = Vec::new();
        write_json(&mut out, 404, &serde_json::json!({"error": "not_found"}))
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.ends_with(r#"{"error":"not_found"}"#));
    }
}
