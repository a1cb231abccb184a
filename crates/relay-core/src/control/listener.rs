//! HTTP accept loop and route dispatch.
//!
//! Non-blocking listener, 50ms poll against a `running` flag, one thread per
//! connection. Each connection is read through the header block's blank
//! line, then through its `Content-Length` body if any, parsed, dispatched,
//! and closed — no keep-alive, matching `Connection: close` on every
//! response.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::control::request::HttpRequest;
use crate::control::response::HttpResponse;
use crate::control::types::{ErrorResponse, ListenRequest, ListenResponse, ServeRequest, ServeResponse};
use crate::error::RelayError;
use crate::registry::SessionRegistry;
use crate::rendezvous::RendezvousService;

/// Spawn the control-plane HTTP accept loop on its own thread.
pub fn spawn_accept_loop(
    listener: TcpListener,
    rendezvous: RendezvousService,
    registry: SessionRegistry,
    config: Arc<RelayConfig>,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || accept_loop(listener, rendezvous, registry, config, running));
}

fn accept_loop(
    listener: TcpListener,
    rendezvous: RendezvousService,
    registry: SessionRegistry,
    config: Arc<RelayConfig>,
    running: Arc<AtomicBool>,
) {
    tracing::info!(addr = ?listener.local_addr().ok(), "control HTTP listener started");

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let rendezvous = rendezvous.clone();
                let registry = registry.clone();
                let config = config.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &rendezvous, &registry, &config) {
                        tracing::warn!(%peer_addr, error = %err, "control connection error");
                    }
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "control TCP accept error");
                }
            }
        }
    }

    tracing::debug!("control accept loop exited");
}

fn handle_connection(
    stream: TcpStream,
    rendezvous: &RendezvousService,
    registry: &SessionRegistry,
    config: &RelayConfig,
) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let mut head = String::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line)? {
            0 => return Ok(()),
            _ => {
                head.push_str(&line);
                if line == "\r\n" || line == "\n" {
                    break;
                }
            }
        }
    }

    let mut request = match HttpRequest::parse_head(&head) {
        Ok(request) => request,
        Err(_) => {
            write_response(&mut writer, &HttpResponse::bad_request());
            return Ok(());
        }
    };

    if let Some(len) = request.content_length() {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        request.body = body;
    }

    tracing::debug!(method = %request.method, path = %request.path, "control request");

    let response = route(&request, rendezvous, registry, config);
    write_response(&mut writer, &response);
    Ok(())
}

fn write_response(writer: &mut TcpStream, response: &HttpResponse) {
    let _ = writer.write_all(&response.serialize());
}

fn route(
    request: &HttpRequest,
    rendezvous: &RendezvousService,
    registry: &SessionRegistry,
    config: &RelayConfig,
) -> HttpResponse {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/api/relay/serve") => handle_serve(request, rendezvous, config),
        ("POST", "/api/relay/listen") => handle_listen(request, rendezvous, config),
        ("DELETE", path) if path.starts_with("/api/relay/session/") => {
            handle_complete(path, registry)
        }
        _ => HttpResponse::not_found().with_json_body(
            serde_json::to_vec(&ErrorResponse::new("no such route")).unwrap_or_default(),
        ),
    }
}

fn handle_serve(request: &HttpRequest, rendezvous: &RendezvousService, config: &RelayConfig) -> HttpResponse {
    let body: ServeRequest = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(err) => return error_response(&RelayError::invalid("body", err.to_string())),
    };

    match rendezvous.initiate(
        body.sender_fp,
        body.receiver_fp,
        body.filename,
        body.file_size,
        body.signature,
        body.file_hash,
    ) {
        Ok(session) => {
            let resp = ServeResponse::from_session(&session, config.socket_port);
            HttpResponse::ok().with_json_body(serde_json::to_vec(&resp).unwrap_or_default())
        }
        Err(err) => error_response(&err),
    }
}

fn handle_listen(request: &HttpRequest, rendezvous: &RendezvousService, config: &RelayConfig) -> HttpResponse {
    let body: ListenRequest = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(err) => return error_response(&RelayError::invalid("body", err.to_string())),
    };

    match rendezvous.listen(body.receiver_fp) {
        Ok(session) => {
            let resp = ListenResponse::from_session(&session, config.socket_port);
            HttpResponse::ok().with_json_body(serde_json::to_vec(&resp).unwrap_or_default())
        }
        Err(err) => error_response(&err),
    }
}

fn handle_complete(path: &str, registry: &SessionRegistry) -> HttpResponse {
    let session_id = path.trim_start_matches("/api/relay/session/");
    registry.complete_session(session_id);
    HttpResponse::ok().with_text_body("Session completed")
}

/// Map a [`RelayError`] to its HTTP status: `InvalidArgument` -> 400,
/// `Timeout` -> 408, `Conflict` -> 409. Every other variant is a data-plane
/// error that should never reach this boundary; treated as 500 rather than
/// panicking.
fn error_response(err: &RelayError) -> HttpResponse {
    let body = match err {
        RelayError::InvalidArgument { .. } => {
            serde_json::to_vec(&ErrorResponse::new(err.to_string())).unwrap_or_default()
        }
        RelayError::Timeout => serde_json::to_vec(&ErrorResponse::timeout(err.to_string())).unwrap_or_default(),
        RelayError::Conflict(_) => serde_json::to_vec(&ErrorResponse::new(err.to_string())).unwrap_or_default(),
        other => serde_json::to_vec(&ErrorResponse::new(other.to_string())).unwrap_or_default(),
    };

    match err {
        RelayError::InvalidArgument { .. } => HttpResponse::bad_request().with_json_body(body),
        RelayError::Timeout => HttpResponse::request_timeout().with_json_body(body),
        RelayError::Conflict(_) => HttpResponse::conflict().with_json_body(body),
        _ => HttpResponse::internal_error().with_json_body(body),
    }
}
