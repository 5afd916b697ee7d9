//! Contracts between the transport and the protocol it carries.
//!
//! The transport never looks inside requests or responses. It feeds bytes to
//! a [`RequestParser`], asks a [`ResponseCreator`] for a response once the
//! parser is done (or a stock response when it is not), and writes whatever
//! [`Encode`] produces.

use bytes::BytesMut;

/// Result of advancing a parser over the bytes posted so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    NeedData,
    Complete,
    Error(String),
}

/// Why a canned response is being produced instead of a normal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockReason {
    /// Malformed or otherwise unacceptable input.
    ClientError,
    /// The request did not arrive before the request timer fired.
    RequestTimeout,
}

/// Incremental parser bound to a single request.
pub trait RequestParser: Send + 'static {
    type Request: Send + 'static;

    /// Resets the parser to expect the start of a request.
    fn init_model(&mut self);

    /// Appends raw bytes read from the socket.
    fn post_buffer(&mut self, buf: &[u8]);

    /// Advances parsing over everything posted so far.
    fn poll(&mut self) -> ParseStatus;

    /// Whether the last `poll` ran out of input.
    fn need_data(&self) -> bool;

    /// The parsed request, once `poll` has reported completion.
    fn request(&self) -> Option<&Self::Request>;
}

/// Serializes a response into the connection's write buffer.
pub trait Encode {
    fn encode(&self, dst: &mut BytesMut);
}

/// Builds requests and responses for the protocol carried by the transport.
///
/// Calls are synchronous and must not block; an `Err` stops the connection
/// without writing anything.
pub trait ResponseCreator: Send + Sync + 'static {
    type Parser: RequestParser;
    type Response: Encode + Send + 'static;

    /// A fresh request together with a parser bound to it.
    fn create_parser(&self) -> Self::Parser;

    fn create_response(
        &self,
        request: &<Self::Parser as RequestParser>::Request,
    ) -> anyhow::Result<Self::Response>;

    /// `request` is `None` when parsing never completed.
    fn create_stock_response(
        &self,
        request: Option<&<Self::Parser as RequestParser>::Request>,
        reason: StockReason,
    ) -> anyhow::Result<Self::Response>;
}
