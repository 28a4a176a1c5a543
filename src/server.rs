//! HTTP front end
//!
//! A plain hyper HTTP/1 server in front of an [`AssetPipeline`].
//!
//! # Endpoints
//! - `GET {installation}/{set}/{version}/...` - Combined resource set
//! - `GET {installation}/` - JSON map of set name to public URL
//! - `GET /stats` - JSON output cache statistics
//! - `GET /metrics` - Prometheus metrics, when enabled
//!
//! `HEAD` is accepted wherever `GET` is.

use crate::error::Result;
use crate::pipeline::{AssetPipeline, Reply};
use crate::processor::AssetResponse;
use crate::request::RequestContext;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Header a TLS-terminating proxy sets for requests that arrived over https
const FORWARDED_PROTO: &str = "x-forwarded-proto";

pub struct AssetServer {
    pipeline: Arc<AssetPipeline>,
}

impl AssetServer {
    pub fn new(pipeline: Arc<AssetPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<AssetPipeline> {
        &self.pipeline
    }

    /// Bind the configured listen address and serve forever
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(&self.pipeline.config().listen_address).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted on `listener`
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Asset server listening on http://{}", addr);
        info!("  GET /stats   - Output cache statistics");
        if self.pipeline.config().enable_metrics {
            info!("  GET /metrics - Prometheus metrics");
        }

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("Accepted connection from {}", peer);
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::task::spawn(async move {
                let result = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let server = server.clone();
                            handle_request(server, req)
                        }),
                    )
                    .await;

                if let Err(err) = result {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

/// Route one request
async fn handle_request(
    server: Arc<AssetServer>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::http::Error> {
    let head = match *req.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, "GET, HEAD")
                .body(Full::new(Bytes::new()));
        }
    };

    let pipeline = &server.pipeline;
    let path = req.uri().path().to_string();
    match path.as_str() {
        "/metrics" if pipeline.config().enable_metrics => match pipeline.metrics().encode() {
            Ok(text) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(text))),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        "/stats" => json_response(&pipeline.output_cache_stats()),
        _ => {
            let secure = is_secure(&req);
            let ctx = RequestContext::new(req.headers().clone(), secure);
            match pipeline.handle(&path, ctx).await {
                Reply::Asset(response) => Ok(into_hyper(response, head)),
                Reply::Index(map) => json_response(&map),
            }
        }
    }
}

fn is_secure<B>(req: &Request<B>) -> bool {
    req.uri().scheme_str() == Some("https")
        || req
            .headers()
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("https"))
}

fn into_hyper(response: AssetResponse, head: bool) -> Response<Full<Bytes>> {
    let body = if head { Bytes::new() } else { response.body };
    let mut res = Response::new(Full::new(body));
    *res.status_mut() = response.status;
    *res.headers_mut() = response.headers;
    res
}

fn json_response<T: serde::Serialize>(
    value: &T,
) -> std::result::Result<Response<Full<Bytes>>, hyper::http::Error> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Full::new(Bytes::from(body))),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> std::result::Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
}
