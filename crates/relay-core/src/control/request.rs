//! Hand-rolled HTTP/1.1 request line + header parser: `METHOD PATH
//! HTTP/1.1`, headers, and an optional `Content-Length` body.

/// A parsed HTTP/1.1 request, body included (if `Content-Length` was read).
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Errors this module's own parsing can fail with, distinct from
/// [`crate::error::RelayError`] since a malformed HTTP request is never a
/// domain error — it is always a `400` with no further interpretation.
#[derive(Debug)]
pub enum ParseError {
    EmptyRequest,
    InvalidRequestLine,
    InvalidHeader,
}

impl HttpRequest {
    /// Parse the request line and headers from `raw` (everything up to, but
    /// not including, the body). The caller has already read through the
    /// blank line terminating the header block.
    pub fn parse_head(raw: &str) -> Result<Self, ParseError> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(ParseError::EmptyRequest)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = parts[0].to_string();
        let path = parts[1].to_string();
        let version = parts[2].to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon_pos = line.find(':').ok_or(ParseError::InvalidHeader)?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(HttpRequest {
            method,
            path,
            version,
            headers,
            body: Vec::new(),
        })
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length")?.trim().parse().ok()
    }
}
