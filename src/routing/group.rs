//! Route declaration surface.
//!
//! A [`RouteGroup`] collects routes per HTTP method, the group's scope
//! middlewares, and mounts of child groups under a path prefix. Groups are
//! plain values: the builder consumes them to produce a
//! [`RouteTable`](crate::routing::RouteTable).

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::http::handler::{EventSourceHandler, Handler, HttpHandler, WebSocketHandler};
use crate::http::middleware::Middleware;

/// A route as declared by application code, before compilation.
#[derive(Clone)]
pub struct RouteDecl {
    pub(crate) path: String,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) handler: Handler,
}

impl RouteDecl {
    fn new(path: &str, handler: Handler) -> Self {
        Self {
            path: path.to_string(),
            middlewares: Vec::new(),
            handler,
        }
    }

    /// Attach an entry-local middleware. Runs after all inherited middleware.
    pub fn middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Attach an already shared middleware.
    pub fn middleware_arc(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// The declared path template.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A child group nested under a path prefix.
#[derive(Clone)]
pub struct Mount {
    pub(crate) prefix: String,
    pub(crate) group: RouteGroup,
}

/// A named collection of routes, scope middlewares, and mounts.
#[derive(Clone, Default)]
pub struct RouteGroup {
    pub(crate) routes: HashMap<Method, Vec<RouteDecl>>,
    pub(crate) mounts: Vec<Mount>,
    pub(crate) scope_middlewares: Vec<Arc<dyn Middleware>>,
}

impl RouteGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a route for `method` with any handler kind.
    pub fn route(&mut self, method: Method, path: &str, handler: Handler) -> &mut RouteDecl {
        let routes = self.routes.entry(method).or_default();
        routes.push(RouteDecl::new(path, handler));
        let last = routes.len() - 1;
        &mut routes[last]
    }

    pub fn get<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::GET, path, Handler::http(handler))
    }

    pub fn post<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::POST, path, Handler::http(handler))
    }

    pub fn put<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::PUT, path, Handler::http(handler))
    }

    pub fn patch<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::PATCH, path, Handler::http(handler))
    }

    pub fn delete<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::DELETE, path, Handler::http(handler))
    }

    pub fn head<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::HEAD, path, Handler::http(handler))
    }

    pub fn options<H: HttpHandler + 'static>(&mut self, path: &str, handler: H) -> &mut RouteDecl {
        self.route(Method::OPTIONS, path, Handler::http(handler))
    }

    /// Declare a WebSocket endpoint (upgraded from a GET request).
    pub fn websocket<H: WebSocketHandler + 'static>(
        &mut self,
        path: &str,
        handler: H,
    ) -> &mut RouteDecl {
        self.route(Method::GET, path, Handler::websocket(handler))
    }

    /// Declare an EventSource endpoint (GET with a streamed body).
    pub fn eventsource<H: EventSourceHandler + 'static>(
        &mut self,
        path: &str,
        handler: H,
    ) -> &mut RouteDecl {
        self.route(Method::GET, path, Handler::eventsource(handler))
    }

    /// Add a scope middleware, inherited by every route declared in or
    /// mounted under this group.
    pub fn scope<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.scope_middlewares.push(Arc::new(middleware));
        self
    }

    /// Add an already shared scope middleware.
    pub fn scope_arc(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.scope_middlewares.push(middleware);
        self
    }

    /// Nest `group` under `prefix`.
    pub fn mount(&mut self, prefix: &str, group: RouteGroup) -> &mut Self {
        self.mounts.push(Mount {
            prefix: prefix.to_string(),
            group,
        });
        self
    }

    /// Number of routes declared directly in this group (mounts excluded).
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.mounts.is_empty()
    }
}
