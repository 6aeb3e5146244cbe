//! `GET /api/health` and `GET /api/documents/:id`, spec.md §6's minimal
//! HTTP surface. Hand-rolled directly over `TcpStream` rather than pulling
//! in a web framework — the teacher's own preference is to frame wire
//! protocols itself (`editor.rs`, `editor_protocol.rs`) rather than lean on
//! an off-the-shelf server, and two read-only endpoints don't earn a new
//! dependency.
use std::sync::Arc;

use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::protocol::DocumentId;
use crate::registry::Registry;

/// Accepts connections until the process is asked to shut down, answering
/// each with exactly one response before closing — there's no keep-alive,
/// which is fine for a status endpoint polled occasionally.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>, cors_origin: Arc<str>) {
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "health listener accept failed");
                continue;
            }
        };
        let registry = Arc::clone(&registry);
        let cors_origin = Arc::clone(&cors_origin);
        tokio::spawn(async move {
            if let Err(err) = respond(stream, &registry, &cors_origin).await {
                debug!(%err, "health request failed");
            }
        });
    }
}

async fn respond(mut stream: TcpStream, registry: &Registry, cors_origin: &str) -> std::io::Result<()> {
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut origin_header: Option<String> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(value) = line.strip_prefix("Origin:").or_else(|| line.strip_prefix("origin:")) {
            origin_header = Some(value.trim().to_string());
        }
    }

    // `*` accepts any origin; otherwise a present `Origin` header must match
    // exactly, per SYNCPAD_CORS_ORIGIN's documented handshake check.
    if cors_origin != "*" {
        if let Some(origin) = &origin_header {
            if origin != cors_origin {
                return write_response(&mut stream, "403 Forbidden", r#"{"error":"origin not allowed"}"#.to_string(), cors_origin).await;
            }
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (status, body) = route(path, registry).await;
    write_response(&mut stream, status, body, cors_origin).await
}

async fn write_response(stream: &mut TcpStream, status: &str, body: String, cors_origin: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: {cors_origin}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

async fn route(path: &str, registry: &Registry) -> (&'static str, String) {
    if path == "/api/health" {
        let documents = registry.document_count().await;
        let timestamp = OffsetDateTime::now_utc().format(&Iso8601::DEFAULT).unwrap_or_default();
        let body = serde_json::json!({
            "status": "ok",
            "documents": documents,
            "timestamp": timestamp,
        });
        return ("200 OK", body.to_string());
    }

    if let Some(id) = path.strip_prefix("/api/documents/") {
        let document_id = DocumentId::new(id);
        if registry.contains(&document_id).await {
            let session = registry.get_or_create(&document_id).await;
            let snapshot = session.snapshot().await;
            let body = serde_json::json!({
                "id": document_id.as_ref(),
                "content": snapshot.content,
                "version": snapshot.version,
                "active_users": snapshot.users.len(),
            });
            return ("200 OK", body.to_string());
        }
        let error = RelayError::UnknownDocument(document_id);
        return ("404 Not Found", serde_json::json!({ "error": error.to_string() }).to_string());
    }

    ("404 Not Found", r#"{"error":"not found"}"#.to_string())
}
