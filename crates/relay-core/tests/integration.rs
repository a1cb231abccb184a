//! End-to-end scenarios over real sockets: HTTP control requests plus TCP
//! data-plane handshakes.
//!
//! Each test starts its own [`RelayServer`] on a fixed, test-local port
//! pair rather than port 0, since the assertions need a known address up
//! front.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use relay_core::{RelayConfig, RelayServer};
use serde_json::{json, Value};

fn start_server(http_port: u16, socket_port: u16, blocking_timeout: Duration) -> RelayServer {
    let config = RelayConfig {
        http_addr: format!("127.0.0.1:{http_port}"),
        socket_addr: format!("127.0.0.1:{socket_port}"),
        socket_port,
        worker_threads: None,
        backlog: 16,
        blocking_timeout,
        session_expiry: Duration::from_secs(120),
    };
    let server = RelayServer::new(config);
    server.start().expect("server start");
    std::thread::sleep(Duration::from_millis(50));
    server
}

fn http_request(port: u16, method: &str, path: &str, body: &Value) -> (u16, Value) {
    let addr = format!("127.0.0.1:{port}")
        .to_socket_addrs()
        .unwrap()
        .next()
        .unwrap();
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let payload = serde_json::to_vec(body).unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nContent-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        payload.len()
    );
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(&payload).unwrap();

    let mut reader = BufReader::new(stream);
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            break;
        }
        head.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }

    let status: u16 = head
        .lines()
        .next()
        .unwrap()
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();

    let len: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    let mut body_buf = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body_buf).unwrap();
    }
    let parsed: Value = if len > 0 {
        serde_json::from_slice(&body_buf).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_buf).into_owned()))
    } else {
        Value::Null
    };

    (status, parsed)
}

fn connect_data_plane(socket_port: u16, session_id: &str, role: &str) -> TcpStream {
    let addr = format!("127.0.0.1:{socket_port}")
        .to_socket_addrs()
        .unwrap()
        .next()
        .unwrap();
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect data plane");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
        .write_all(format!("{session_id}:{role}\n").as_bytes())
        .unwrap();
    stream
}

fn read_line(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

#[test]
fn sender_first_then_receiver_matches_over_http() {
    let server = start_server(18180, 18280, Duration::from_secs(5));

    let server2_handle = {
        let handle = std::thread::spawn(move || {
            http_request(
                18180,
                "POST",
                "/api/relay/serve",
                &json!({
                    "senderFp": "alice", "receiverFp": "bob", "filename": "doc.pdf",
                    "fileSize": 1024, "signature": "sig", "fileHash": "hash"
                }),
            )
        });
        std::thread::sleep(Duration::from_millis(100));
        handle
    };

    let (listen_status, listen_body) =
        http_request(18180, "POST", "/api/relay/listen", &json!({"receiverFp": "bob"}));
    let (serve_status, serve_body) = server2_handle.join().unwrap();

    assert_eq!(serve_status, 200);
    assert_eq!(listen_status, 200);
    assert_eq!(serve_body["sessionId"], listen_body["sessionId"]);
    assert_eq!(listen_body["senderFp"], "alice");
    assert_eq!(listen_body["filename"], "doc.pdf");

    server.stop();
}

#[test]
fn bad_request_returns_400() {
    let server = start_server(18181, 18281, Duration::from_secs(5));

    let (status, body) = http_request(
        18181,
        "POST",
        "/api/relay/serve",
        &json!({"senderFp": "", "receiverFp": "bob", "filename": "f", "fileSize": 1, "signature": "s", "fileHash": "h"}),
    );

    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");

    server.stop();
}

#[test]
fn initiate_without_a_listener_times_out_with_408() {
    let server = start_server(18182, 18282, Duration::from_millis(200));

    let (status, body) = http_request(
        18182,
        "POST",
        "/api/relay/serve",
        &json!({
            "senderFp": "alice", "receiverFp": "nobody", "filename": "f",
            "fileSize": 1, "signature": "s", "fileHash": "h"
        }),
    );

    assert_eq!(status, 408);
    assert_eq!(body["status"], "timeout");

    server.stop();
}

#[test]
fn second_listen_for_same_fingerprint_returns_409() {
    let server = start_server(18183, 18283, Duration::from_secs(2));

    let first = std::thread::spawn(move || {
        http_request(18183, "POST", "/api/relay/listen", &json!({"receiverFp": "carol"}))
    });
    std::thread::sleep(Duration::from_millis(100));

    let (status, _) = http_request(18183, "POST", "/api/relay/listen", &json!({"receiverFp": "carol"}));
    assert_eq!(status, 409);

    // Let the first Listen time out so its thread can join cleanly.
    first.join().unwrap();
    server.stop();
}

#[test]
fn full_transfer_forwards_all_bytes_and_counts_them() {
    let server = start_server(18184, 18284, Duration::from_secs(5));

    let serve_handle = std::thread::spawn(move || {
        http_request(
            18184,
            "POST",
            "/api/relay/serve",
            &json!({
                "senderFp": "alice", "receiverFp": "bob", "filename": "payload.bin",
                "fileSize": 1048576, "signature": "sig", "fileHash": "hash"
            }),
        )
    });
    std::thread::sleep(Duration::from_millis(100));
    let (_, listen_body) = http_request(18184, "POST", "/api/relay/listen", &json!({"receiverFp": "bob"}));
    let (_, serve_body) = serve_handle.join().unwrap();
    let session_id = serve_body["sessionId"].as_str().unwrap().to_string();
    assert_eq!(session_id, listen_body["sessionId"].as_str().unwrap());

    let mut sender = connect_data_plane(18284, &session_id, "sender");
    let mut receiver = connect_data_plane(18284, &session_id, "receiver");

    assert_eq!(read_line(&mut sender), "READY");
    assert_eq!(read_line(&mut receiver), "READY");

    sender.write_all(b"ACK\n").unwrap();
    receiver.write_all(b"ACK\n").unwrap();

    let payload = vec![0xABu8; 1024 * 1024];
    let sender_writer_handle = {
        let mut sender = sender.try_clone().unwrap();
        let payload = payload.clone();
        std::thread::spawn(move || {
            sender.write_all(&payload).unwrap();
            sender.shutdown(std::net::Shutdown::Write).unwrap();
        })
    };

    let mut received = Vec::with_capacity(payload.len());
    let mut buf = [0u8; 64 * 1024];
    loop {
        match receiver.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
        if received.len() >= payload.len() {
            break;
        }
    }
    sender_writer_handle.join().unwrap();

    assert_eq!(received.len(), payload.len());
    assert_eq!(received, payload);

    std::thread::sleep(Duration::from_millis(100));
    assert!(server.registry().total_bytes_transferred() >= payload.len() as u64);

    server.stop();
}

#[test]
fn payload_sent_before_both_acks_is_buffered_then_flushed() {
    let server = start_server(18185, 18285, Duration::from_secs(5));

    let serve_handle = std::thread::spawn(move || {
        http_request(
            18185,
            "POST",
            "/api/relay/serve",
            &json!({
                "senderFp": "alice", "receiverFp": "bob", "filename": "f",
                "fileSize": 65536, "signature": "s", "fileHash": "h"
            }),
        )
    });
    std::thread::sleep(Duration::from_millis(100));
    let (_, listen_body) = http_request(18185, "POST", "/api/relay/listen", &json!({"receiverFp": "bob"}));
    let (_, serve_body) = serve_handle.join().unwrap();
    let session_id = serve_body["sessionId"].as_str().unwrap().to_string();
    assert_eq!(session_id, listen_body["sessionId"].as_str().unwrap());

    let mut sender = connect_data_plane(18285, &session_id, "sender");
    let mut receiver = connect_data_plane(18285, &session_id, "receiver");

    assert_eq!(read_line(&mut sender), "READY");
    assert_eq!(read_line(&mut receiver), "READY");

    // Sender sends ACK immediately followed (same write) by 64 KiB of
    // payload, before the receiver has acked at all.
    let early_payload = vec![0x11u8; 64 * 1024];
    let mut ack_and_payload = b"ACK\n".to_vec();
    ack_and_payload.extend_from_slice(&early_payload);
    sender.write_all(&ack_and_payload).unwrap();

    std::thread::sleep(Duration::from_millis(150));
    receiver.write_all(b"ACK\n").unwrap();

    let mut received = Vec::with_capacity(early_payload.len());
    let mut buf = [0u8; 64 * 1024];
    while received.len() < early_payload.len() {
        let n = receiver.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }

    assert_eq!(received, early_payload);

    server.stop();
}

#[test]
fn peer_drop_mid_transfer_yields_partial_byte_count() {
    let server = start_server(18186, 18286, Duration::from_secs(5));

    let serve_handle = std::thread::spawn(move || {
        http_request(
            18186,
            "POST",
            "/api/relay/serve",
            &json!({
                "senderFp": "alice", "receiverFp": "bob", "filename": "f",
                "fileSize": 4096, "signature": "s", "fileHash": "h"
            }),
        )
    });
    std::thread::sleep(Duration::from_millis(100));
    let (_, listen_body) = http_request(18186, "POST", "/api/relay/listen", &json!({"receiverFp": "bob"}));
    let (_, serve_body) = serve_handle.join().unwrap();
    let session_id = serve_body["sessionId"].as_str().unwrap().to_string();
    assert_eq!(session_id, listen_body["sessionId"].as_str().unwrap());

    let mut sender = connect_data_plane(18286, &session_id, "sender");
    let mut receiver = connect_data_plane(18286, &session_id, "receiver");
    assert_eq!(read_line(&mut sender), "READY");
    assert_eq!(read_line(&mut receiver), "READY");
    sender.write_all(b"ACK\n").unwrap();
    receiver.write_all(b"ACK\n").unwrap();

    let partial = vec![0x42u8; 2048];
    sender.write_all(&partial).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    // Sender drops without sending the rest.
    drop(sender);

    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match receiver.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }

    assert_eq!(received.len(), partial.len());

    server.stop();
}

#[test]
fn handshake_for_an_absent_session_closes_the_connection() {
    let server = start_server(18187, 18287, Duration::from_secs(5));

    let mut stream = connect_data_plane(18287, "0000000000000000deadbeefdeadbeef", "sender");
    let mut buf = [0u8; 16];
    let result = stream.read(&mut buf);
    assert!(matches!(result, Ok(0)) || result.is_err());

    server.stop();
}

#[test]
fn delete_session_endpoint_is_idempotent() {
    let server = start_server(18188, 18288, Duration::from_secs(5));

    let (status1, body1) = http_request(18188, "DELETE", "/api/relay/session/unknown-id", &Value::Null);
    let (status2, _) = http_request(18188, "DELETE", "/api/relay/session/unknown-id", &Value::Null);

    assert_eq!(status1, 200);
    assert_eq!(status2, 200);
    assert_eq!(body1, Value::String("Session completed".to_string()));

    server.stop();
}
