//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request (method, path, protocol class)
//!     → lookup: linear scan of table[method], first match of the same class wins;
//!       otherwise the first plain route (or a WebSocket route → 426)
//!     → params stored on the request, fresh CleanRoom bound to it
//!     → branch on handler kind:
//!         WebSocket   → handshake → 101 + session (runs after upgrade)
//!         EventSource → 200 + event stream, handler spawned
//!         Http        → before hooks → handler → after hooks
//!     → Dispatch
//! ```
//!
//! # Design Decisions
//! - No lookup or handler failure escapes: every outcome is a well-formed response
//! - Plain, WebSocket and EventSource routes can share a path; the request class picks one
//! - Long-lived handlers run as their own tasks inside the sandbox

use std::sync::Arc;
use std::time::Instant;

use axum::http::{Method, StatusCode};

use crate::config::{EventSourceConfig, WebSocketConfig};
use crate::http::clean_room::CleanRoom;
use crate::http::error::{DispatchError, HandlerError};
use crate::http::eventsource::{EventSink, EventStream};
use crate::http::handler::{EventSourceHandler, Handler, HttpHandler, WebSocketHandler};
use crate::http::middleware::{run_after, run_before, Flow};
use crate::http::request::{Protocol, Request};
use crate::http::response::Response;
use crate::http::sandbox::Sandbox;
use crate::http::websocket::{handshake, WebSocketSession, WebSocketUpgrade};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionTracker, SessionKind};
use crate::observability::metrics;
use crate::routing::{Params, RouteEntry, RouteTable};

/// What the transport has to do with a request.
pub enum Dispatch {
    /// Send this response.
    Response(Response),
    /// Send the 101 response, then run the session on the upgraded connection.
    Upgrade(WebSocketUpgrade),
    /// Send the 200 response and stream the event body.
    Stream(EventStream),
}

impl Dispatch {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Response(response) => response.status(),
            Self::Upgrade(upgrade) => upgrade.response.status(),
            Self::Stream(stream) => stream.response.status(),
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Self::Upgrade(_) => f.write_str("Upgrade"),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Routes requests to handlers.
pub struct Dispatcher {
    table: Arc<RouteTable>,
    websocket: WebSocketConfig,
    eventsource: EventSourceConfig,
    sessions: Shutdown,
    tracker: ConnectionTracker,
}

impl Dispatcher {
    pub fn new(table: Arc<RouteTable>, websocket: WebSocketConfig, eventsource: EventSourceConfig) -> Self {
        Self {
            table,
            websocket,
            eventsource,
            sessions: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// First entry for `method` whose pattern matches `path` and whose
    /// handler serves `protocol`. Without one, the first entry whose handler
    /// can still answer such a request.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
        protocol: Protocol,
    ) -> Result<(&RouteEntry, Params), DispatchError> {
        self.table
            .find_where(method, path, |entry| entry.handler().serves(protocol))
            .or_else(|| self.table.find_where(method, path, |entry| entry.handler().answers(protocol)))
            .ok_or_else(|| DispatchError::NotFound {
                method: method.clone(),
                path: path.to_string(),
            })
    }

    /// Dispatch one request.
    pub async fn dispatch(&self, mut request: Request) -> Dispatch {
        let start = Instant::now();
        let method = request.method.clone();
        let protocol = request.protocol();

        let (entry, params) = match self.lookup(&request.method, &request.path, protocol) {
            Ok(found) => found,
            Err(error) => {
                tracing::debug!(method = %method, path = %request.path, "No route matched");
                metrics::record_request(method.as_str(), StatusCode::NOT_FOUND.as_u16(), protocol.as_str(), start);
                return Dispatch::Response(error.into_response());
            }
        };
        request.params = params;

        tracing::debug!(
            method = %method,
            path = %request.path,
            route = %entry.template(),
            handler = entry.handler().kind(),
            "Route matched"
        );

        let dispatch = match entry.handler() {
            Handler::WebSocket(handler) if protocol == Protocol::WebSocket => {
                self.upgrade(request, Arc::clone(handler))
            }
            Handler::WebSocket(_) => Dispatch::Response(
                Response::text(StatusCode::UPGRADE_REQUIRED, "Upgrade Required").with_header(
                    axum::http::header::UPGRADE,
                    axum::http::HeaderValue::from_static("websocket"),
                ),
            ),
            Handler::EventSource(handler) => self.stream(request, Arc::clone(handler)),
            Handler::Http(handler) => Dispatch::Response(self.respond(entry, handler.as_ref(), request).await),
        };

        metrics::record_request(method.as_str(), dispatch.status().as_u16(), protocol.as_str(), start);
        dispatch
    }

    /// End every long-lived session (WebSocket close 1001, event streams terminated).
    pub fn close_sessions(&self) {
        tracing::info!(active = self.tracker.active_count(), "Closing long-lived sessions");
        self.sessions.trigger();
    }

    async fn respond(&self, entry: &RouteEntry, handler: &dyn HttpHandler, request: Request) -> Response {
        let middlewares = entry.middlewares();
        let mut room = CleanRoom::new(request.clone());

        let request = match run_before(middlewares, &mut room, request) {
            Ok(Flow::Continue(request)) => request,
            Ok(Flow::Respond(response)) => return response,
            Err(error) => return self.failure(error),
        };
        room.set_request(request.clone());

        let reply = match Sandbox::run_async(handler.call(&mut room)).await {
            Ok(reply) => reply,
            Err(error) => return self.failure(error),
        };
        let response = room.respond(reply);

        match run_after(middlewares, &mut room, &request, response) {
            Ok(response) => response,
            Err(error) => self.failure(error),
        }
    }

    fn upgrade(&self, request: Request, handler: Arc<dyn WebSocketHandler>) -> Dispatch {
        let response = match handshake::respond(&request) {
            Ok(response) => response,
            Err(response) => {
                tracing::debug!(path = %request.path, status = %response.status(), "WebSocket handshake rejected");
                return Dispatch::Response(response);
            }
        };

        let session = WebSocketSession::new(
            CleanRoom::new(request),
            handler,
            self.websocket.clone(),
            self.sessions.subscribe(),
            self.tracker.track(SessionKind::WebSocket),
        );
        Dispatch::Upgrade(WebSocketUpgrade { response, session })
    }

    fn stream(&self, request: Request, handler: Arc<dyn EventSourceHandler>) -> Dispatch {
        let (sink, stream) = EventStream::channel(self.eventsource.buffer);
        let room = CleanRoom::new(request);
        let mut shutdown = self.sessions.subscribe();
        let guard = self.tracker.track(SessionKind::EventSource);

        tokio::spawn(async move {
            let id = guard.id();
            tracing::info!(connection_id = %id, path = %room.request().path, "Event stream opened");
            let result = tokio::select! {
                result = run_stream(handler, room, sink.clone()) => result,
                Ok(()) = shutdown.recv() => Ok(()),
                _ = sink.closed() => {
                    tracing::debug!(connection_id = %id, "Event stream client disconnected");
                    Ok(())
                }
            };
            if let Err(error) = result {
                tracing::error!(connection_id = %id, error = %error, "EventSource handler failed");
                metrics::record_handler_failure("eventsource");
            }
            sink.finish().await;
            tracing::info!(connection_id = %id, "Event stream closed");
            drop(guard);
        });

        Dispatch::Stream(stream)
    }

    fn failure(&self, error: HandlerError) -> Response {
        tracing::error!(error = %error, "Handler failed");
        metrics::record_handler_failure("http");
        DispatchError::HandlerFailure(error).into_response()
    }
}

async fn run_stream(handler: Arc<dyn EventSourceHandler>, room: CleanRoom, sink: EventSink) -> Result<(), HandlerError> {
    Sandbox::run_async(handler.call(room, sink)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::websocket::WebSocket;
    use crate::http::Middleware;
    use crate::routing::RouteGroup;
    use axum::http::header;
    use std::time::Duration;

    struct Block;

    impl Middleware for Block {
        fn before(&self, _room: &mut CleanRoom, request: Request) -> Flow {
            if request.header("x-token").is_some() {
                Flow::Continue(request)
            } else {
                Flow::Respond(Response::text(StatusCode::UNAUTHORIZED, "token required"))
            }
        }
    }

    struct Stamp;

    impl Middleware for Stamp {
        fn after(&self, _room: &mut CleanRoom, _request: &Request, mut response: Response) -> Response {
            response
                .headers_mut()
                .insert("x-stamped", axum::http::HeaderValue::from_static("yes"));
            response
        }
    }

    fn hello(_room: &mut CleanRoom) -> &'static str {
        "Hello World"
    }

    fn user(room: &mut CleanRoom) -> String {
        format!("user {}", room.param("id").unwrap_or("?"))
    }

    fn explode(_room: &mut CleanRoom) -> &'static str {
        panic!("boom")
    }

    fn teapot(_room: &mut CleanRoom) -> Result<&'static str, HandlerError> {
        Err(HandlerError::status(StatusCode::IM_A_TEAPOT, "Hello Error"))
    }

    async fn silent(_room: CleanRoom, _socket: WebSocket) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn greet(_room: CleanRoom, sink: EventSink) -> Result<(), HandlerError> {
        sink.send("Hello").await?;
        sink.send("World").await?;
        Ok(())
    }

    async fn hang(_room: CleanRoom, _sink: EventSink) -> Result<(), HandlerError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn greet_then_panic(_room: CleanRoom, sink: EventSink) -> Result<(), HandlerError> {
        sink.send("Hello").await?;
        panic!("stream handler blew up")
    }

    fn dispatcher() -> Dispatcher {
        let mut admin = RouteGroup::new();
        admin.scope(Block);
        admin.get("/panel", hello);

        let mut root = RouteGroup::new();
        root.get("/", hello).middleware(Stamp);
        root.get("/users/:id", user);
        root.get("/error", explode).middleware(Stamp);
        root.get("/test_error", teapot);
        root.websocket("/websocket", silent);
        root.eventsource("/eventsource", greet);
        root.eventsource("/hang", hang);
        root.eventsource("/half", greet_then_panic);
        root.get("/live", hello);
        root.websocket("/live", silent);
        root.get("/feed", hello);
        root.eventsource("/feed", greet);
        root.mount("/admin", admin);

        let table = RouteTable::build(root).unwrap();
        Dispatcher::new(Arc::new(table), WebSocketConfig::default(), EventSourceConfig::default())
    }

    fn expect_response(dispatch: Dispatch) -> Response {
        match dispatch {
            Dispatch::Response(response) => response,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    fn expect_stream(dispatch: Dispatch) -> EventStream {
        match dispatch {
            Dispatch::Stream(stream) => stream,
            other => panic!("expected stream, got {:?}", other),
        }
    }

    fn upgrade_request(path: &str) -> Request {
        Request::new(Method::GET, path)
            .with_header(header::UPGRADE, "websocket")
            .with_header(header::CONNECTION, "Upgrade")
            .with_header(header::SEC_WEBSOCKET_KEY, "sGxYzKDBdoC2s8ZImlNgow==")
            .with_header(header::SEC_WEBSOCKET_VERSION, "13")
    }

    fn event_request(path: &str) -> Request {
        Request::new(Method::GET, path).with_header(header::ACCEPT, "text/event-stream")
    }

    async fn drain(stream: &mut EventStream) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            body.extend_from_slice(&chunk);
        }
        body
    }

    #[tokio::test]
    async fn test_plain_request() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/")).await);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"Hello World");
        assert_eq!(response.headers()["x-stamped"], "yes");
    }

    #[tokio::test]
    async fn test_params_reach_handler() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/users/7")).await);
        assert_eq!(response.body().as_ref(), b"user 7");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let dispatcher = dispatcher();
        let response = expect_response(dispatcher.dispatch(Request::new(Method::GET, "/nope")).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"404 Not Found");

        let response = expect_response(dispatcher.dispatch(Request::new(Method::POST, "/")).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panic_is_500_and_skips_after_hooks() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/error")).await);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), b"Internal Server Error");
        assert!(response.headers().get("x-stamped").is_none());
    }

    #[tokio::test]
    async fn test_user_defined_error() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/test_error")).await);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.body().as_ref(), b"Hello Error");
    }

    #[tokio::test]
    async fn test_scope_middleware_answers_early() {
        let dispatcher = dispatcher();
        let response = expect_response(dispatcher.dispatch(Request::new(Method::GET, "/admin/panel")).await);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::new(Method::GET, "/admin/panel").with_header(
            axum::http::HeaderName::from_static("x-token"),
            "secret",
        );
        let response = expect_response(dispatcher.dispatch(request).await);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_websocket_route_without_upgrade_is_426() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/websocket")).await);
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn test_websocket_upgrade() {
        let dispatcher = dispatcher();
        match dispatcher.dispatch(upgrade_request("/websocket")).await {
            Dispatch::Upgrade(upgrade) => {
                assert_eq!(upgrade.response.status(), StatusCode::SWITCHING_PROTOCOLS);
                assert_eq!(
                    upgrade.response.headers()[header::SEC_WEBSOCKET_ACCEPT],
                    "zRZMou/76VWlXHo5eoxTMg3tQKQ="
                );
                assert_eq!(dispatcher.tracker().active(SessionKind::WebSocket), 1);
            }
            other => panic!("expected upgrade, got {:?}", other),
        }
        assert_eq!(dispatcher.tracker().active(SessionKind::WebSocket), 0);
    }

    #[tokio::test]
    async fn test_upgrade_without_key_is_400() {
        let request = Request::new(Method::GET, "/websocket")
            .with_header(header::UPGRADE, "websocket")
            .with_header(header::CONNECTION, "Upgrade");
        let response = expect_response(dispatcher().dispatch(request).await);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upgrade_headers_on_plain_route_are_ignored() {
        let request = Request::new(Method::GET, "/")
            .with_header(header::UPGRADE, "websocket")
            .with_header(header::CONNECTION, "Upgrade");
        let response = expect_response(dispatcher().dispatch(request).await);
        assert_eq!(response.body().as_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn test_event_stream() {
        let mut stream = expect_stream(dispatcher().dispatch(event_request("/eventsource")).await);
        assert_eq!(stream.response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(drain(&mut stream).await, b"data: Hello\ndata: World\n\n");
    }

    #[tokio::test]
    async fn test_plain_request_to_event_route_is_404() {
        let response = expect_response(dispatcher().dispatch(Request::new(Method::GET, "/eventsource")).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upgrade_reaches_websocket_route_sharing_a_path() {
        let dispatcher = dispatcher();
        match dispatcher.dispatch(upgrade_request("/live")).await {
            Dispatch::Upgrade(upgrade) => {
                assert_eq!(upgrade.response.status(), StatusCode::SWITCHING_PROTOCOLS);
            }
            other => panic!("expected upgrade, got {:?}", other),
        }

        let response = expect_response(dispatcher.dispatch(Request::new(Method::GET, "/live")).await);
        assert_eq!(response.body().as_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn test_event_request_reaches_stream_route_sharing_a_path() {
        let dispatcher = dispatcher();
        let mut stream = expect_stream(dispatcher.dispatch(event_request("/feed")).await);
        assert_eq!(drain(&mut stream).await, b"data: Hello\ndata: World\n\n");

        let response = expect_response(dispatcher.dispatch(Request::new(Method::GET, "/feed")).await);
        assert_eq!(response.body().as_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn test_event_request_falls_back_to_plain_route() {
        let response = expect_response(dispatcher().dispatch(event_request("/")).await);
        assert_eq!(response.body().as_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn test_client_disconnect_releases_event_handler() {
        let dispatcher = dispatcher();
        let stream = expect_stream(dispatcher.dispatch(event_request("/hang")).await);
        assert_eq!(dispatcher.tracker().active(SessionKind::EventSource), 1);

        drop(stream);
        assert!(dispatcher.tracker().wait_idle(Duration::from_secs(2)).await);
        assert_eq!(dispatcher.tracker().active(SessionKind::EventSource), 0);
    }

    #[tokio::test]
    async fn test_panicking_event_handler_ends_stream() {
        let dispatcher = dispatcher();
        let mut stream = expect_stream(dispatcher.dispatch(event_request("/half")).await);
        assert_eq!(drain(&mut stream).await, b"data: Hello\n\n");
        assert!(dispatcher.tracker().wait_idle(Duration::from_secs(2)).await);
    }
}
