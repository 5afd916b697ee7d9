use ctrl_agent::http::parser::{HttpRequestParser, MAX_REQUEST_SIZE, ParseError, parse_http_request};
use ctrl_agent::server::protocol::{ParseStatus, RequestParser};
use ctrl_agent::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/api");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\n\
        Host: example.com\r\n\
        User-Agent: test-client\r\n\
        Accept: */*\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(parsed.headers.get("User-Agent").unwrap(), "test-client");
    assert_eq!(parsed.headers.get("Accept").unwrap(), "*/*");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.path, "/search?q=rust");
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_http_method() {
    let req = b"INVALID / HTTP/1.1\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_http_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected_method);
    }
}

#[test]
fn test_parse_request_with_empty_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body.len(), 0);
}

#[test]
fn test_parse_request_with_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, vec![0, 1, 2, 3]);
}

#[test]
fn test_parse_header_case_preservation() {
    let req = b"GET / HTTP/1.1\r\nContent-Type: application/json\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    // Headers are stored as-is with trimming
    assert!(parsed.headers.contains_key("Content-Type"));
}

#[test]
fn test_parse_rejects_bad_version() {
    let req = b"GET / FTP/1.0\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidRequest)));
}

#[test]
fn test_incremental_parser_reports_error() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    parser.post_buffer(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n");

    assert!(matches!(parser.poll(), ParseStatus::Error(_)));
    assert!(!parser.need_data());
    assert!(parser.request().is_none());
}

#[test]
fn test_incremental_parser_rejects_oversized_request() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    parser.post_buffer(b"GET / HTTP/1.1\r\nX-Fill: ");
    parser.post_buffer(&vec![b'a'; MAX_REQUEST_SIZE]);

    assert!(matches!(parser.poll(), ParseStatus::Error(_)));
}

#[test]
fn test_incremental_parser_ignores_bytes_after_completion() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    parser.post_buffer(b"GET / HTTP/1.1\r\n\r\n");
    assert_eq!(parser.poll(), ParseStatus::Complete);

    parser.post_buffer(b"garbage");
    assert_eq!(parser.poll(), ParseStatus::Complete);
    assert_eq!(parser.request().unwrap().path, "/");
}

#[test]
fn test_incremental_parser_byte_at_a_time() {
    let req = b"POST /cmd HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\n\r\nstop";
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    let (last, rest) = req.split_last().unwrap();
    for byte in rest {
        parser.post_buffer(std::slice::from_ref(byte));
        assert_eq!(parser.poll(), ParseStatus::NeedData);
    }

    parser.post_buffer(&[*last]);
    assert_eq!(parser.poll(), ParseStatus::Complete);

    let request = parser.request().unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.header("host"), Some("localhost"));
    assert_eq!(request.body, b"stop".to_vec());
}

#[test]
fn test_incremental_parser_terminator_split_across_posts() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    parser.post_buffer(b"GET /status HTTP/1.1\r\nHost: localhost\r\n\r");
    assert_eq!(parser.poll(), ParseStatus::NeedData);

    parser.post_buffer(b"\n");
    assert_eq!(parser.poll(), ParseStatus::Complete);
    assert_eq!(parser.request().unwrap().path, "/status");
}

#[test]
fn test_incremental_parser_rejects_oversized_content_length() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    let head = format!("POST /cmd HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_REQUEST_SIZE);
    parser.post_buffer(head.as_bytes());

    assert!(matches!(parser.poll(), ParseStatus::Error(_)));
    assert!(!parser.need_data());
}

#[test]
fn test_incremental_parser_reset_after_init_model() {
    let mut parser = HttpRequestParser::new();
    parser.init_model();

    parser.post_buffer(b"GET /old HTTP/1.1\r\n");
    assert_eq!(parser.poll(), ParseStatus::NeedData);

    parser.init_model();
    parser.post_buffer(b"GET / HTTP/1.1\r\n\r\n");
    assert_eq!(parser.poll(), ParseStatus::Complete);
    assert_eq!(parser.request().unwrap().path, "/");
}
