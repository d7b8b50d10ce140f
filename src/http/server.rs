//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a single fallback handler
//! - Wire up middleware (timeout, tracing, request ID)
//! - Buffer request bodies and hand them to the dispatcher
//! - Finish WebSocket upgrades and stream event bodies
//! - Close long-lived sessions on graceful shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request as HttpRequest, StatusCode},
    response::Response as HttpResponse,
    Router,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{HttpConfig, ServerConfig};
use crate::http::dispatcher::{Dispatch, Dispatcher};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::websocket::WebSocketUpgrade;
use crate::routing::RouteTable;

/// Application state injected into the fallback handler.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
}

/// HTTP server in front of a frozen route table.
pub struct Server {
    router: Router,
    dispatcher: Arc<Dispatcher>,
    drain_timeout: Duration,
}

impl Server {
    pub fn new(config: &ServerConfig, table: Arc<RouteTable>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            table,
            config.websocket.clone(),
            config.eventsource.clone(),
        ));
        let state = AppState {
            dispatcher: Arc::clone(&dispatcher),
            max_body_size: config.http.max_body_size,
        };

        Self {
            router: Self::build_router(&config.http, state),
            dispatcher,
            drain_timeout: Duration::from_millis(config.websocket.close_timeout_ms),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &HttpConfig, state: AppState) -> Router {
        let layers = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));

        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(layers)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve on `listener` until `signal` resolves, then stop accepting,
    /// close open sessions and wait for in-flight connections.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.dispatcher.table().len(), "HTTP server starting");

        let dispatcher = Arc::clone(&self.dispatcher);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("Graceful shutdown started");
                dispatcher.close_sessions();
            })
            .await?;

        let tracker = self.dispatcher.tracker();
        if !tracker.wait_idle(self.drain_timeout).await {
            tracing::warn!(remaining = tracker.active_count(), "Sessions still open after drain timeout");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Convert the transport request, dispatch it, and finish whatever the
/// dispatcher decided (plain response, upgrade, or event stream).
async fn dispatch_handler(State(state): State<AppState>, mut request: HttpRequest<Body>) -> HttpResponse {
    let on_upgrade = hyper::upgrade::on(&mut request);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Request body rejected");
            return Response::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_http();
        }
    };

    let target = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut core = Request::from_target(parts.method, target);
    core.headers = parts.headers;
    core.body = body;

    match state.dispatcher.dispatch(core).await {
        Dispatch::Response(response) => response.into_http(),
        Dispatch::Upgrade(WebSocketUpgrade { response, session }) => {
            let id = session.id();
            tokio::spawn(async move {
                match on_upgrade.await {
                    Ok(upgraded) => session.run(TokioIo::new(upgraded)).await,
                    Err(e) => tracing::warn!(session = %id, error = %e, "WebSocket upgrade failed"),
                }
            });
            response.into_http()
        }
        Dispatch::Stream(stream) => {
            let (head, chunks) = stream.into_parts();
            let mut response = head.into_http();
            *response.body_mut() = Body::from_stream(chunks);
            response
        }
    }
}
