//! Connection handling: hyper in, buffered request through the app, out

use super::app::App;
use crate::error::MirageError;
use crate::middleware::{HttpResponse, RequestContext};
use crate::render::error_response;
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error};

/// Serves every request on one accepted connection
pub struct RequestHandler {
    app: Arc<App>,
    max_body_size: u64,
}

impl RequestHandler {
    pub fn new(app: Arc<App>) -> Self {
        let max_body_size = app.state().config.server.max_body_size;
        Self { app, max_body_size }
    }

    /// Handle HTTP/1.1 connection. When `stopped` resolves the connection
    /// finishes its in-flight request and closes.
    pub async fn handle<F>(self, stream: TcpStream, addr: SocketAddr, stopped: F)
    where
        F: Future<Output = ()>,
    {
        let io = TokioIo::new(stream);
        let app = self.app;
        let limit = self.max_body_size;

        let service = service_fn(move |req: Request<Incoming>| {
            let app = app.clone();
            let client_ip = addr.ip().to_string();

            async move {
                let ctx = RequestContext::new().with_client_ip(client_ip);
                Ok::<_, Infallible>(handle_request(req, ctx, app, limit).await)
            }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);
        tokio::pin!(stopped);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = &mut stopped => {
                debug!("Closing connection from {} for shutdown", addr);
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(e) = result {
            if !e.is_incomplete_message() {
                debug!("HTTP connection error: {}", e);
            }
        }
    }
}

/// Buffer the body and run the request on its own task, so a client that
/// disconnects mid-delay does not cut the pipeline short.
async fn handle_request(
    req: Request<Incoming>,
    ctx: RequestContext,
    app: Arc<App>,
    limit: u64,
) -> HttpResponse {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, limit).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };
    let request = Request::from_parts(parts, body);

    match tokio::spawn(async move { app.dispatch(request, ctx).await }).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request task failed: {}", e);
            error_response(&MirageError::Internal("request task failed".to_string()))
        }
    }
}

async fn read_body(body: Incoming, limit: u64) -> Result<Bytes, MirageError> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(MirageError::PayloadTooLarge(limit as u64))
        }
        Err(e) => Err(MirageError::InvalidRequest(format!(
            "Error reading body: {}",
            e
        ))),
    }
}
