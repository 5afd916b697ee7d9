use ctrl_agent::http::request::{Method, Request};
use std::collections::HashMap;

fn request_with(headers: HashMap<String, String>) -> Request {
    Request {
        method: Method::POST,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    }
}

#[test]
fn test_request_header_retrieval() {
    let mut headers = HashMap::new();
    headers.insert("Host".to_string(), "example.com".to_string());
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    let req = request_with(headers);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let mut headers = HashMap::new();
    headers.insert("content-length".to_string(), "7".to_string());

    let req = request_with(headers);

    assert_eq!(req.header("Content-Length"), Some("7"));
    assert_eq!(req.content_length(), 7);
}

#[test]
fn test_request_content_length_missing() {
    let req = request_with(HashMap::new());
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_content_length_invalid() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "not-a-number".to_string());

    let req = request_with(headers);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("INVALID"), None);
    assert_eq!(Method::from_str("get"), None); // Case-sensitive
}

#[test]
fn test_request_method_display() {
    assert_eq!(Method::HEAD.to_string(), "HEAD");
    assert_eq!(Method::OPTIONS.as_str(), "OPTIONS");
}
