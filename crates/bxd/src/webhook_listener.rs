//! Minimal HTTP/1.1 listener for the single inbound edge in scope (§6.2):
//! `POST /webhooks/bitrix`. The administrative surface (§6.3) is
//! deliberately not wired to routes here — see `orchestrator`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::orchestrator::SyncOrchestrator;

const MAX_BODY_BYTES: usize = 1 << 20;

pub async fn serve(host: &str, port: u16, orchestrator: Arc<SyncOrchestrator>) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "webhook listener bound");

    loop {
        let (socket, _) = listener.accept().await?;
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, orchestrator).await {
                warn!(%err, "webhook connection error");
            }
        });
    }
}

async fn handle_connection(mut socket: tokio::net::TcpStream, orchestrator: Arc<SyncOrchestrator>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.split();
    let mut reader = BufReader::new(read_half);
    let (request_line, headers) = read_headers(&mut reader).await?;

    let content_length = headers
        .iter()
        .find(|h| h.eq_ignore_ascii_case("content-length") || h.to_ascii_lowercase().starts_with("content-length:"))
        .and_then(|h| h.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_BODY_BYTES);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }
    let body = String::from_utf8_lossy(&body);

    debug!(request_line, "webhook request received");

    let response_body = if request_line.starts_with("POST /webhooks/bitrix") {
        orchestrator.webhook_intake(&body).await
    } else {
        serde_json::json!({ "status": "not_found" })
    };

    let payload = response_body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        payload.len(),
        payload
    );
    write_half.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Reads the request line and header lines up to the blank-line
/// terminator, not the body — the caller reads exactly
/// `Content-Length` bytes afterward.
async fn read_headers<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> anyhow::Result<(String, Vec<String>)> {
    use tokio::io::AsyncBufReadExt;

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let request_line = request_line.trim_end().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line.trim_end().is_empty() {
            break;
        }
        headers.push(line.trim_end().to_string());
    }
    Ok((request_line, headers))
}
