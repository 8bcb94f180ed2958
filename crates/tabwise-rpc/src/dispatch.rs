//! Receiving-side dispatch: resolve, validate, execute, reply.
//!
//! The dispatcher turns every inbound request envelope into exactly one
//! response envelope. Unknown paths become 404s, schema rejections become
//! 400s with the full issue list, and handler failures become 500s carrying
//! the raw error; nothing escapes as a panic or a Rust error. Each dispatch
//! is independent — callers may invoke it from several threads at once, and
//! handlers must not assume mutual exclusion.

use tracing::{debug, warn};

use tabwise_wire::{RequestEnvelope, ResponseEnvelope};

use crate::route::RouteFailure;
use crate::router::Router;

/// Tracing target for dispatch decisions.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Resolves inbound envelopes against a registry and produces replies.
#[derive(Debug)]
pub struct Dispatcher<C> {
    router: Router<C>,
}

impl<C> Dispatcher<C> {
    /// Creates a dispatcher over a built registry.
    #[must_use]
    pub const fn new(router: Router<C>) -> Self {
        Self { router }
    }

    /// Handles one request, always returning a response envelope.
    ///
    /// The context is caller-supplied per dispatch (for example the identity
    /// of the tab the request concerns); the dispatcher itself holds no
    /// mutable state.
    pub fn dispatch(&self, request: &RequestEnvelope, ctx: &C) -> ResponseEnvelope {
        let correlation_id = request.correlation_id;

        let Some(route) = self.router.lookup(&request.route) else {
            debug!(
                target: DISPATCH_TARGET,
                route = %request.route,
                id = %correlation_id,
                "no such route"
            );
            return ResponseEnvelope::not_found(
                correlation_id,
                format!("route '{}' not found", request.route),
            );
        };

        debug!(
            target: DISPATCH_TARGET,
            route = %request.route,
            id = %correlation_id,
            "dispatching request"
        );

        match route.invoke(&request.input, ctx) {
            Ok(payload) => ResponseEnvelope::success(correlation_id, payload),
            Err(RouteFailure::Invalid(issues)) => {
                debug!(
                    target: DISPATCH_TARGET,
                    route = %request.route,
                    id = %correlation_id,
                    issues = issues.len(),
                    "input failed validation"
                );
                ResponseEnvelope::invalid_input(correlation_id, issues)
            }
            Err(RouteFailure::Failed(error)) => {
                warn!(
                    target: DISPATCH_TARGET,
                    route = %request.route,
                    id = %correlation_id,
                    %error,
                    "handler failed"
                );
                ResponseEnvelope::failed(correlation_id, error.to_value())
            }
        }
    }
}
