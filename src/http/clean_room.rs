//! Request-scoped context shared by middleware and handlers.

use axum::http::{header, Extensions, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;

use crate::http::handler::Reply;
use crate::http::request::Request;
use crate::http::response::Response;

/// Value of the `Server` header on default responses.
pub const SERVER_NAME: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

/// Isolated per-request context.
///
/// Holds the current request, the pieces of the default response (status,
/// headers, body) and a typed extension map middleware can use to hand
/// data to the handler. A new room is created for every request and is
/// never shared between tasks.
#[derive(Debug)]
pub struct CleanRoom {
    request: Request,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    extensions: Extensions,
}

impl CleanRoom {
    pub fn new(request: Request) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
        Self {
            request,
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Replace the request, e.g. with the one returned by a middleware.
    pub fn set_request(&mut self, request: Request) {
        self.request = request;
    }

    /// Shorthand for a route parameter of the current request.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The response described by the room's current status, headers and body.
    pub fn raw_response(&self) -> Response {
        Response::new(self.status, self.headers.clone(), self.body.clone())
    }

    /// Turn a handler reply into the response sent to the client.
    pub fn respond(&mut self, reply: Reply) -> Response {
        match reply {
            Reply::Response(response) => response,
            Reply::Body(body) => {
                self.body = body;
                self.raw_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_default_response() {
        let room = CleanRoom::new(Request::new(Method::GET, "/"));
        let response = room.raw_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], SERVER_NAME);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_body_reply_uses_room_status() {
        let mut room = CleanRoom::new(Request::new(Method::GET, "/"));
        room.status = StatusCode::ACCEPTED;
        let response = room.respond(Reply::Body(Bytes::from_static(b"queued")));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"queued");
    }

    #[test]
    fn test_full_reply_replaces_room() {
        let mut room = CleanRoom::new(Request::new(Method::GET, "/"));
        let response = room.respond(Reply::Response(Response::empty(StatusCode::NO_CONTENT)));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::SERVER).is_none());
    }

    #[test]
    fn test_extensions_carry_typed_data() {
        #[derive(Clone, Debug, PartialEq)]
        struct User(&'static str);

        let mut room = CleanRoom::new(Request::new(Method::GET, "/"));
        room.extensions_mut().insert(User("ada"));
        assert_eq!(room.extensions().get::<User>(), Some(&User("ada")));
    }
}
