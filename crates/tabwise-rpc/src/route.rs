//! Route definition: a validator paired with a handler.
//!
//! A route embeds its input schema and handler behind a type-erased invoke
//! function so the registry stays homogeneous. Nothing executes at
//! definition time; the schema runs on every dispatch because the channel
//! carries no type information and the sender may be version-skewed or
//! hostile.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use tabwise_wire::Issue;

use crate::schema::Schema;

/// A named call contract shared by the caller and the handling side.
///
/// One implementing type fixes the full dotted path and the input and output
/// types for a route, so the caller's [`crate::Client::call`] and the
/// handler registered through [`crate::RouterBuilder::operation`] cannot
/// disagree without failing to compile. The registry additionally verifies
/// at build time that the route was registered at `PATH`.
pub trait Operation {
    /// Full dotted route path, for example `page.details`.
    const PATH: &'static str;
    /// Input type the caller supplies and the schema produces.
    type Input: Serialize;
    /// Output type the handler returns and the caller receives.
    type Output: Serialize + DeserializeOwned;
}

/// Failure raised by a route handler after validation succeeded.
///
/// Carried back to the caller verbatim inside the status-500 envelope; the
/// dispatcher attaches no interpretation of its own.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    details: Option<Value>,
}

impl HandlerError {
    /// Creates a handler error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attaches a structured detail value for upstream logging.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Encodes the error as the wire value carried by a 500 response.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("message".to_owned(), Value::String(self.message.clone()));
        if let Some(details) = &self.details {
            object.insert("details".to_owned(), details.clone());
        }
        Value::Object(object)
    }
}

/// Outcome of invoking a route against raw input.
#[derive(Debug)]
pub(crate) enum RouteFailure {
    /// The schema rejected the input; the handler never ran.
    Invalid(Vec<Issue>),
    /// The handler (or output serialisation) failed.
    Failed(HandlerError),
}

type InvokeFn<C> = dyn Fn(&Value, &C) -> Result<Value, RouteFailure> + Send + Sync;

/// A schema-validated request handler, opaque once defined.
pub struct Route<C> {
    declared_path: Option<&'static str>,
    invoke: Box<InvokeFn<C>>,
}

impl<C> Route<C> {
    /// Defines a route from a validator and a handler.
    ///
    /// The schema is the single source of truth for the input shape; the
    /// handler only ever sees values the schema produced. The handler's
    /// output is serialised when the route is invoked, and a serialisation
    /// failure surfaces as a handler failure rather than a panic.
    pub fn new<I, O, S, H>(schema: S, handler: H) -> Self
    where
        I: 'static,
        O: Serialize + 'static,
        S: Schema<I> + 'static,
        H: Fn(I, &C) -> Result<O, HandlerError> + Send + Sync + 'static,
    {
        Self {
            declared_path: None,
            invoke: Box::new(move |input, ctx| {
                let parsed = schema.parse(input).map_err(RouteFailure::Invalid)?;
                let output = handler(parsed, ctx).map_err(RouteFailure::Failed)?;
                serde_json::to_value(output).map_err(|error| {
                    RouteFailure::Failed(HandlerError::new(format!(
                        "failed to serialise handler output: {error}"
                    )))
                })
            }),
        }
    }

    /// Defines a route bound to a typed [`Operation`].
    ///
    /// The handler's input and output types are pinned to the operation's,
    /// and the registry verifies at build time that the route is registered
    /// at [`Operation::PATH`].
    pub fn for_operation<O, S, H>(schema: S, handler: H) -> Self
    where
        O: Operation,
        O::Input: 'static,
        O::Output: 'static,
        S: Schema<O::Input> + 'static,
        H: Fn(O::Input, &C) -> Result<O::Output, HandlerError> + Send + Sync + 'static,
    {
        let mut route = Self::new(schema, handler);
        route.declared_path = Some(O::PATH);
        route
    }

    /// Path this route declared through its operation, when typed.
    pub(crate) const fn declared_path(&self) -> Option<&'static str> {
        self.declared_path
    }

    /// Validates and runs the route against raw input.
    pub(crate) fn invoke(&self, input: &Value, ctx: &C) -> Result<Value, RouteFailure> {
        (self.invoke)(input, ctx)
    }
}

impl<C> std::fmt::Debug for Route<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Route")
            .field("declared_path", &self.declared_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::schema;

    use super::*;

    #[test]
    fn invokes_handler_with_parsed_input() {
        let route: Route<()> =
            Route::new(schema::text, |name: String, _ctx: &()| Ok(format!("Hello {name}")));
        let payload = route.invoke(&json!("Sam"), &()).expect("invoke");
        assert_eq!(payload, json!("Hello Sam"));
    }

    #[test]
    fn validation_failure_skips_handler() {
        let route: Route<()> = Route::new(schema::text, |_name: String, _ctx: &()| -> Result<String, HandlerError> {
            panic!("handler must not run")
        });
        let failure = route.invoke(&json!(3), &()).expect_err("must fail");
        assert!(matches!(failure, RouteFailure::Invalid(issues) if issues.len() == 1));
    }

    #[test]
    fn handler_failure_is_reported_not_thrown() {
        let route: Route<()> = Route::new(schema::text, |_name: String, _ctx: &()| -> Result<String, HandlerError> {
            Err(HandlerError::new("division failed"))
        });
        let failure = route.invoke(&json!("x"), &()).expect_err("must fail");
        assert!(matches!(failure, RouteFailure::Failed(error) if error.to_value()["message"] == "division failed"));
    }

    #[test]
    fn handler_error_encodes_details() {
        let error = HandlerError::new("boom").with_details(json!({ "code": 7 }));
        let value = error.to_value();
        assert_eq!(value["message"], "boom");
        assert_eq!(value["details"]["code"], 7);
    }
}
