use crate::http::parser::HttpRequestParser;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::server::protocol::{ResponseCreator, StockReason};

const STATUS_PATHS: &[&str] = &["/", "/status"];

/// Default responder for the control channel.
///
/// `GET /` and `GET /status` report readiness; HEAD returns the same headers
/// without a body.
#[derive(Debug, Clone)]
pub struct HttpResponseCreator {
    banner: String,
}

impl HttpResponseCreator {
    pub fn new(banner: impl Into<String>) -> Self {
        Self {
            banner: banner.into(),
        }
    }
}

impl Default for HttpResponseCreator {
    fn default() -> Self {
        Self::new(format!("ctrl-agent {} ready\n", env!("CARGO_PKG_VERSION")))
    }
}

impl ResponseCreator for HttpResponseCreator {
    type Parser = HttpRequestParser;
    type Response = Response;

    fn create_parser(&self) -> HttpRequestParser {
        HttpRequestParser::new()
    }

    fn create_response(&self, request: &Request) -> anyhow::Result<Response> {
        let path = request.path.split('?').next().unwrap_or_default();

        let response = match request.method {
            Method::GET | Method::HEAD if !STATUS_PATHS.contains(&path) => {
                Response::stock(StatusCode::NotFound)
            }
            Method::GET => Response::ok(self.banner.as_bytes()),
            Method::HEAD => ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", "text/plain")
                .header("Content-Length", self.banner.len().to_string())
                .build(),
            _ => {
                let mut response = Response::stock(StatusCode::MethodNotAllowed);
                response
                    .headers
                    .insert("Allow".to_string(), "GET, HEAD".to_string());
                response
            }
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "Created response"
        );

        Ok(response)
    }

    fn create_stock_response(
        &self,
        _request: Option<&Request>,
        reason: StockReason,
    ) -> anyhow::Result<Response> {
        let status = match reason {
            StockReason::ClientError => StatusCode::BadRequest,
            StockReason::RequestTimeout => StatusCode::RequestTimeout,
        };
        Ok(Response::stock(status))
    }
}
