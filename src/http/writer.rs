use bytes::{BufMut, BytesMut};

use crate::http::response::Response;
use crate::server::protocol::Encode;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response: status line, headers (sorted by name), blank line, body.
pub fn serialize_response(resp: &Response, dst: &mut BytesMut) {
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    dst.put_slice(status_line.as_bytes());

    let mut headers: Vec<_> = resp.headers.iter().collect();
    headers.sort();

    for (k, v) in headers {
        dst.put_slice(k.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(v.as_bytes());
        dst.put_slice(b"\r\n");
    }

    dst.put_slice(b"\r\n");
    dst.put_slice(&resp.body);
}

impl Encode for Response {
    fn encode(&self, dst: &mut BytesMut) {
        serialize_response(self, dst);
    }
}
