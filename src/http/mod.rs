//! Default HTTP/1.1 plug-in for the control channel.
//!
//! The transport in [`crate::server`] is protocol-agnostic; this module
//! supplies the pieces it needs to speak HTTP:
//!
//! - **`parser`**: incremental request parser ([`parser::HttpRequestParser`])
//! - **`request`**: parsed request representation
//! - **`response`**: status codes, responses and the builder
//! - **`writer`**: response serialization into the write buffer
//! - **`creator`**: the responder answering requests and producing stock
//!   400/408 responses
//!
//! Every response carries `Connection: close`; a connection serves exactly
//! one request.

pub mod creator;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
