//! Middleware hooks and the chain executor.
//!
//! # Execution Order
//! ```text
//! before:  chain[0] → chain[1] → … → chain[n]   (stops at the first Respond)
//! handler
//! after:   chain[0] → chain[1] → … → chain[n]   (same order, never reversed)
//! ```
//!
//! Chains are built by the route table: ancestor scope middlewares first,
//! then the group's own scope, then entry-local middlewares.

use std::sync::Arc;

use crate::http::clean_room::CleanRoom;
use crate::http::error::HandlerError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::sandbox::Sandbox;

/// Result of a `before` hook.
#[derive(Debug)]
pub enum Flow {
    /// Continue with this (possibly modified) request.
    Continue(Request),
    /// Answer immediately; the handler and `after` hooks are skipped.
    Respond(Response),
}

/// Cross-cutting request/response transformer.
///
/// Both hooks default to no-ops, so an implementation only overrides what
/// it needs.
pub trait Middleware: Send + Sync {
    fn before(&self, _room: &mut CleanRoom, request: Request) -> Flow {
        Flow::Continue(request)
    }

    fn after(&self, _room: &mut CleanRoom, _request: &Request, response: Response) -> Response {
        response
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Run every `before` hook in chain order.
pub fn run_before(
    middlewares: &[Arc<dyn Middleware>],
    room: &mut CleanRoom,
    mut request: Request,
) -> Result<Flow, HandlerError> {
    for middleware in middlewares {
        match Sandbox::run(room, |room| middleware.before(room, request))? {
            Flow::Continue(next) => request = next,
            Flow::Respond(response) => {
                tracing::debug!(
                    middleware = middleware.name(),
                    status = %response.status(),
                    "Request answered by middleware"
                );
                return Ok(Flow::Respond(response));
            }
        }
    }
    Ok(Flow::Continue(request))
}

/// Run every `after` hook in chain order.
pub fn run_after(
    middlewares: &[Arc<dyn Middleware>],
    room: &mut CleanRoom,
    request: &Request,
    mut response: Response,
) -> Result<Response, HandlerError> {
    for middleware in middlewares {
        response = Sandbox::run(room, |room| middleware.after(room, request, response))?;
    }
    Ok(response)
}
