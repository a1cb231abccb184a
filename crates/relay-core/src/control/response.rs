//! Builder-pattern HTTP/1.1 response with automatic `Content-Length`.

#[must_use]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub const SERVER_AGENT: &str = "relay-core/0.1";

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &'static str) -> Self {
        HttpResponse {
            status_code,
            status_text,
            headers: vec![
                ("Server".to_string(), SERVER_AGENT.to_string()),
                ("Connection".to_string(), "close".to_string()),
            ],
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    pub fn request_timeout() -> Self {
        Self::new(408, "Request Timeout")
    }

    pub fn conflict() -> Self {
        Self::new(409, "Conflict")
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_json_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        self
    }

    pub fn with_text_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers
            .push(("Content-Type".to_string(), "text/plain".to_string()));
        self
    }

    /// Serialize to the HTTP/1.1 wire format. `Content-Length` is appended
    /// automatically based on the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}
