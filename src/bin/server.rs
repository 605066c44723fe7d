//! HTTP server for the sensor analysis agent.
//! Simple HTTP server using tokio and basic HTTP handling.

use airlens::config::Config;
use airlens::pipeline::Pipeline;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    let charts_dir = config.charts_dir.clone();

    if config.llm_api_key.is_empty() {
        info!("No API key configured; model calls will fail until LLM_API_KEY is set");
    }

    let pipeline = Arc::new(Pipeline::new(config)?);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from {}", addr);
        let pipeline = Arc::clone(&pipeline);
        let charts_dir = charts_dir.clone();
        tokio::spawn(async move {
            handle_connection(stream, pipeline, charts_dir).await;
        });
    }
}

const MAX_REQUEST_BYTES: usize = 1_000_000;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

async fn handle_connection(
    mut stream: TcpStream,
    pipeline: Arc<Pipeline>,
    charts_dir: std::path::PathBuf,
) {
    let buffer = match timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Err(_) => {
            error!("Request read timeout");
            return;
        }
    };
    if buffer.is_empty() {
        return;
    }

    let request = String::from_utf8_lossy(&buffer).to_string();
    let response = handle_request(&request, &pipeline, &charts_dir).await;

    if let Err(e) = stream.write_all(&response).await {
        error!("Failed to write response: {}", e);
    }
}

/// Read one HTTP request, continuing until the `Content-Length` body has
/// fully arrived. Clients may deliver headers and body in separate
/// segments; a single read must not be treated as the whole request.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk).await? {
            0 => break,
            n => {
                buffer.extend_from_slice(&chunk[..n]);
                if request_is_complete(&buffer) {
                    break;
                }
                if buffer.len() > MAX_REQUEST_BYTES {
                    break;
                }
            }
        }
    }
    Ok(buffer)
}

/// A request is complete once the headers have ended and `Content-Length`
/// more bytes of body are present (no declared length means no body).
fn request_is_complete(buffer: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buffer);
    let Some(headers_end) = text.find("\r\n\r\n") else {
        return false;
    };
    match extract_content_length(&text) {
        Some(content_length) => buffer.len() >= headers_end + 4 + content_length,
        None => true,
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

async fn handle_request(
    request: &str,
    pipeline: &Pipeline,
    charts_dir: &std::path::Path,
) -> Vec<u8> {
    let request_line = match request.lines().next() {
        Some(line) => line,
        None => return json_response(400, "Bad Request", "{}"),
    };
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return json_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let mut path = parts[1].to_string();
    if let Some(query_start) = path.find('?') {
        path.truncate(query_start);
    }
    let path = path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    info!("Request: {} {}", method, path);

    match (method, path) {
        ("GET", "/api/health") => {
            json_response(200, "OK", r#"{"status":"ok","service":"airlens"}"#)
        }
        ("POST", "/query") => {
            let question = extract_query(request);
            if question.is_empty() {
                return json_response(400, "Bad Request", r#"{"error":"Query is required"}"#);
            }
            let result = pipeline.run(&question).await;
            match serde_json::to_string(&result) {
                Ok(body) => json_response(200, "OK", &body),
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    json_response(
                        500,
                        "Internal Server Error",
                        r#"{"error":"Failed to serialize response"}"#,
                    )
                }
            }
        }
        ("GET", chart) if chart.starts_with("/charts/") => {
            serve_chart(chart.trim_start_matches("/charts/"), charts_dir)
        }
        ("OPTIONS", _) => json_response(200, "OK", ""),
        _ => json_response(
            404,
            "Not Found",
            &format!(r#"{{"error":"Endpoint not found: {} {}"}}"#, method, path),
        ),
    }
}

/// Pull the question out of a `{"query": "..."}` request body.
fn extract_query(request: &str) -> String {
    let body_start = request.find("\r\n\r\n").unwrap_or(request.len());
    let body = request[body_start..].trim();

    if let Some(json_start) = body.find('{') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body[json_start..]) {
            return json
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
        }
    }
    String::new()
}

fn serve_chart(filename: &str, charts_dir: &std::path::Path) -> Vec<u8> {
    // Reject path components so only files inside the charts dir resolve.
    if filename.contains("..") || filename.contains('/') {
        return json_response(400, "Bad Request", r#"{"error":"Invalid chart name"}"#);
    }
    match std::fs::read(charts_dir.join(filename)) {
        Ok(bytes) => binary_response(200, "OK", "image/png", &bytes),
        Err(_) => json_response(404, "Not Found", r#"{"error":"Chart not found"}"#),
    }
}

fn json_response(status: u16, status_text: &str, body: &str) -> Vec<u8> {
    binary_response(status, status_text, "application/json", body.as_bytes())
}

fn binary_response(status: u16, status_text: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n",
        status,
        status_text,
        content_type,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"query": "average co2 per room"}"#;

    fn post_request(body: &str) -> String {
        format!(
            "POST /query HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[test]
    fn test_headers_without_body_are_incomplete() {
        let request = post_request(BODY);
        let headers_only = &request[..request.find("\r\n\r\n").unwrap() + 4];
        assert!(!request_is_complete(headers_only.as_bytes()));
    }

    #[test]
    fn test_partial_body_is_incomplete() {
        let request = post_request(BODY);
        assert!(!request_is_complete(request[..request.len() - 10].as_bytes()));
    }

    #[test]
    fn test_full_body_is_complete() {
        assert!(request_is_complete(post_request(BODY).as_bytes()));
    }

    #[test]
    fn test_no_content_length_completes_at_header_end() {
        let request = "GET /api/health HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert!(request_is_complete(request.as_bytes()));
    }

    #[test]
    fn test_query_survives_reassembled_segments() {
        // Body delivered in a second segment still parses once reassembled.
        let request = post_request(BODY);
        let split = request.find("\r\n\r\n").unwrap() + 4;
        let mut buffer = request.as_bytes()[..split].to_vec();
        assert!(!request_is_complete(&buffer));
        buffer.extend_from_slice(&request.as_bytes()[split..]);
        assert!(request_is_complete(&buffer));

        let reassembled = String::from_utf8(buffer).unwrap();
        assert_eq!(extract_query(&reassembled), "average co2 per room");
    }

    #[test]
    fn test_extract_content_length_case_insensitive() {
        let request = "POST /query HTTP/1.1\r\ncontent-length: 42\r\n\r\n";
        assert_eq!(extract_content_length(request), Some(42));
    }
}
