use std::collections::HashMap;

use bytes::BytesMut;
use thiserror::Error;

use crate::http::request::{Method, Request};
use crate::server::protocol::{ParseStatus, RequestParser};

/// Requests whose head and body together exceed this are rejected.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequest,
    #[error("unknown method")]
    InvalidMethod,
    #[error("malformed header")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("request incomplete")]
    Incomplete,
}

/// Parses one request from the start of `buf`.
///
/// Returns the request and the number of bytes it occupied.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = find_headers_end(buf, 0).ok_or(ParseError::Incomplete)?;
    let head = parse_head(&buf[..headers_end])?;
    let body_start = headers_end + 4;

    if buf.len() - body_start < head.content_length {
        return Err(ParseError::Incomplete);
    }

    let consumed = body_start + head.content_length;
    Ok((head.into_request(&buf[body_start..consumed]), consumed))
}

/// Request line and headers, without the body.
#[derive(Debug)]
struct Head {
    method: Method,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    content_length: usize,
}

impl Head {
    fn into_request(self, body: &[u8]) -> Request {
        Request {
            method: self.method,
            path: self.path,
            version: self.version,
            headers: self.headers,
            body: body.to_vec(),
        }
    }
}

/// Parses the bytes before the blank line that ends the headers.
fn parse_head(header_bytes: &[u8]) -> Result<Head, ParseError> {
    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, v)| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    Ok(Head {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        content_length,
    })
}

/// Position of the first `\r\n\r\n` at or after `from`.
fn find_headers_end(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| from + pos)
}

/// Incremental [`RequestParser`] for HTTP/1.x.
///
/// Each byte is scanned once while looking for the end of the headers; the
/// head is parsed a single time and the body is then only counted. Bytes after
/// the first complete request are ignored.
#[derive(Debug)]
pub struct HttpRequestParser {
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for the header terminator.
    scanned: usize,
    /// Parsed head and the offset where its body starts.
    head: Option<(Head, usize)>,
    request: Option<Request>,
    status: ParseStatus,
}

impl HttpRequestParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            head: None,
            request: None,
            status: ParseStatus::NeedData,
        }
    }

    pub fn status(&self) -> &ParseStatus {
        &self.status
    }

    fn advance(&mut self) -> ParseStatus {
        if self.head.is_none() {
            // A terminator may straddle the previous scan boundary.
            let from = self.scanned.saturating_sub(3);
            let Some(headers_end) = find_headers_end(&self.buffer, from) else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_REQUEST_SIZE {
                    return too_large();
                }
                return ParseStatus::NeedData;
            };

            let head = match parse_head(&self.buffer[..headers_end]) {
                Ok(head) => head,
                Err(e) => return ParseStatus::Error(e.to_string()),
            };

            let body_start = headers_end + 4;
            if body_start.saturating_add(head.content_length) > MAX_REQUEST_SIZE {
                return too_large();
            }
            self.head = Some((head, body_start));
        }

        let Some((head, body_start)) = &self.head else {
            return ParseStatus::NeedData;
        };
        let body_end = body_start + head.content_length;
        if self.buffer.len() < body_end {
            return ParseStatus::NeedData;
        }

        if let Some((head, body_start)) = self.head.take() {
            self.request = Some(head.into_request(&self.buffer[body_start..body_end]));
        }
        ParseStatus::Complete
    }
}

fn too_large() -> ParseStatus {
    ParseStatus::Error(format!("request exceeds {} bytes", MAX_REQUEST_SIZE))
}

impl Default for HttpRequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser for HttpRequestParser {
    type Request = Request;

    fn init_model(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.head = None;
        self.request = None;
        self.status = ParseStatus::NeedData;
    }

    fn post_buffer(&mut self, buf: &[u8]) {
        if self.status == ParseStatus::NeedData {
            self.buffer.extend_from_slice(buf);
        }
    }

    fn poll(&mut self) -> ParseStatus {
        if self.status != ParseStatus::NeedData {
            return self.status.clone();
        }

        self.status = self.advance();
        self.status.clone()
    }

    fn need_data(&self) -> bool {
        self.status == ParseStatus::NeedData
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }
}
