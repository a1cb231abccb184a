//! Request/response JSON bodies for the three control routes.

use serde::{Deserialize, Serialize};

use crate::registry::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeRequest {
    pub sender_fp: String,
    pub receiver_fp: String,
    pub filename: String,
    pub file_size: i64,
    pub signature: String,
    pub file_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeResponse {
    pub status: &'static str,
    pub session_id: String,
    pub socket_port: u16,
    pub message: &'static str,
    pub expires_in: u64,
}

impl ServeResponse {
    pub fn from_session(session: &Session, socket_port: u16) -> Self {
        ServeResponse {
            status: "matched",
            session_id: session.session_id.clone(),
            socket_port,
            message: "sender and receiver matched",
            expires_in: session.expires_in_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenRequest {
    pub receiver_fp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenResponse {
    pub status: &'static str,
    pub session_id: String,
    pub sender_fp: String,
    pub filename: String,
    pub file_size: u64,
    pub signature: String,
    pub file_hash: String,
    pub socket_port: u16,
    pub message: &'static str,
}

impl ListenResponse {
    pub fn from_session(session: &Session, socket_port: u16) -> Self {
        ListenResponse {
            status: "matched",
            session_id: session.session_id.clone(),
            sender_fp: session.sender_fp.as_str().to_string(),
            filename: session.filename.clone(),
            file_size: session.file_size,
            signature: session.signature.clone(),
            file_hash: session.file_hash.clone(),
            socket_port,
            message: "sender and receiver matched",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorResponse {
            status: "error",
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ErrorResponse {
            status: "timeout",
            message: message.into(),
        }
    }
}
