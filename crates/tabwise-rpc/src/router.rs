//! The read-only route registry addressed by dotted path.
//!
//! Registration accepts a tree of named routes and nested sub-trees, but the
//! built registry is a flat map from full dotted path to route: resolution
//! is a single lookup, and "not found" needs no tree walking. The registry
//! never changes after `build`.

use std::collections::HashMap;

use thiserror::Error;

use crate::route::{Operation, Route};
use crate::schema::Schema;

/// Errors detected while flattening a route tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterBuildError {
    /// A route or sub-tree name was empty or contained a path separator.
    #[error("invalid route name '{name}'")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// Two registrations flattened to the same dotted path.
    #[error("duplicate route path '{path}'")]
    DuplicatePath {
        /// The colliding path.
        path: String,
    },

    /// A typed operation was registered somewhere other than its declared
    /// path.
    #[error("route declares path '{declared}' but was registered at '{registered}'")]
    PathMismatch {
        /// Path named by the operation's contract.
        declared: String,
        /// Path the registration actually flattened to.
        registered: String,
    },
}

/// Builder accepting named routes and nested sub-trees.
pub struct RouterBuilder<C> {
    routes: Vec<(String, Route<C>)>,
    nested: Vec<(String, RouterBuilder<C>)>,
}

impl<C> Default for RouterBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RouterBuilder<C> {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            routes: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Registers a route under a single-segment name.
    #[must_use]
    pub fn route(mut self, name: impl Into<String>, route: Route<C>) -> Self {
        self.routes.push((name.into(), route));
        self
    }

    /// Registers a sub-tree under a single-segment name.
    #[must_use]
    pub fn nest(mut self, name: impl Into<String>, builder: Self) -> Self {
        self.nested.push((name.into(), builder));
        self
    }

    /// Registers a typed operation at its declared path.
    ///
    /// The route lands at [`Operation::PATH`] regardless of nesting, so this
    /// belongs on the root builder; registering it inside a sub-tree is a
    /// build-time [`RouterBuildError::PathMismatch`].
    #[must_use]
    pub fn operation<O, S, H>(mut self, schema: S, handler: H) -> Self
    where
        O: Operation,
        O::Input: 'static,
        O::Output: 'static,
        S: Schema<O::Input> + 'static,
        H: Fn(O::Input, &C) -> Result<O::Output, crate::route::HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.routes
            .push((O::PATH.to_owned(), Route::for_operation::<O, S, H>(schema, handler)));
        self
    }

    /// Flattens the tree into the canonical registry.
    ///
    /// # Errors
    ///
    /// Returns a [`RouterBuildError`] for invalid names, colliding paths, or
    /// typed operations registered away from their declared path.
    pub fn build(self) -> Result<Router<C>, RouterBuildError> {
        let mut routes = HashMap::new();
        self.flatten(None, &mut routes)?;
        Ok(Router { routes })
    }

    fn flatten(
        self,
        prefix: Option<&str>,
        into: &mut HashMap<String, Route<C>>,
    ) -> Result<(), RouterBuildError> {
        for (name, route) in self.routes {
            // Typed operations carry dots in their registered name; plain
            // names must stay single-segment.
            if name.is_empty() || (route.declared_path().is_none() && name.contains('.')) {
                return Err(RouterBuildError::InvalidName { name });
            }
            let path = join_path(prefix, &name);
            if let Some(declared) = route.declared_path()
                && declared != path
            {
                return Err(RouterBuildError::PathMismatch {
                    declared: declared.to_owned(),
                    registered: path,
                });
            }
            if into.contains_key(&path) {
                return Err(RouterBuildError::DuplicatePath { path });
            }
            into.insert(path, route);
        }
        for (name, builder) in self.nested {
            if name.is_empty() || name.contains('.') {
                return Err(RouterBuildError::InvalidName { name });
            }
            let path = join_path(prefix, &name);
            builder.flatten(Some(&path), into)?;
        }
        Ok(())
    }
}

fn join_path(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_owned(),
    }
}

/// The canonical, immutable registry of routes by full dotted path.
#[derive(Debug)]
pub struct Router<C> {
    routes: HashMap<String, Route<C>>,
}

impl<C> Router<C> {
    /// Resolves a full dotted path to its route.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Route<C>> {
        self.routes.get(path)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterates the registered dotted paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::route::HandlerError;
    use crate::schema;

    use super::*;

    fn greet_route() -> Route<()> {
        Route::new(schema::text, |name: String, _ctx: &()| Ok(format!("Hello {name}")))
    }

    #[test]
    fn flattens_nested_trees_to_dotted_paths() {
        let router = RouterBuilder::new()
            .route("greet", greet_route())
            .nest("page", RouterBuilder::new().route("content", greet_route()))
            .build()
            .expect("build");
        assert_eq!(router.len(), 2);
        assert!(router.lookup("greet").is_some());
        assert!(router.lookup("page.content").is_some());
        assert!(router.lookup("page").is_none());
        assert!(router.lookup("page.content.extra").is_none());
    }

    #[test]
    fn rejects_duplicate_paths() {
        let error = RouterBuilder::new()
            .route("greet", greet_route())
            .route("greet", greet_route())
            .build()
            .expect_err("duplicate");
        assert_eq!(
            error,
            RouterBuildError::DuplicatePath {
                path: "greet".to_owned()
            }
        );
    }

    #[test]
    fn rejects_dotted_plain_names() {
        let error = RouterBuilder::<()>::new()
            .route("page.content", greet_route())
            .build()
            .expect_err("invalid name");
        assert!(matches!(error, RouterBuildError::InvalidName { .. }));
    }

    #[test]
    fn rejects_empty_names() {
        let error = RouterBuilder::<()>::new()
            .nest("", RouterBuilder::new())
            .build()
            .expect_err("invalid name");
        assert!(matches!(error, RouterBuildError::InvalidName { .. }));
    }

    #[test]
    fn typed_operation_lands_at_declared_path() {
        struct Shout;
        impl crate::route::Operation for Shout {
            const PATH: &'static str = "voice.shout";
            type Input = String;
            type Output = String;
        }

        let router = RouterBuilder::<()>::new()
            .operation::<Shout, _, _>(schema::text, |text, _ctx| Ok(text.to_uppercase()))
            .build()
            .expect("build");
        let route = router.lookup("voice.shout").expect("route exists");
        let payload = route.invoke(&json!("hi"), &()).expect("invoke");
        assert_eq!(payload, json!("HI"));
    }

    #[test]
    fn typed_operation_in_wrong_subtree_is_a_build_error() {
        struct Shout;
        impl crate::route::Operation for Shout {
            const PATH: &'static str = "voice.shout";
            type Input = String;
            type Output = String;
        }

        let nested = RouterBuilder::<()>::new()
            .operation::<Shout, _, _>(schema::text, |text, _ctx| Ok(text));
        let error = RouterBuilder::new()
            .nest("outer", nested)
            .build()
            .expect_err("mismatch");
        assert!(matches!(error, RouterBuildError::PathMismatch { .. }));
    }

    #[test]
    fn handler_error_type_is_reachable_from_operations() {
        struct Fails;
        impl crate::route::Operation for Fails {
            const PATH: &'static str = "always.fails";
            type Input = String;
            type Output = String;
        }

        let router = RouterBuilder::<()>::new()
            .operation::<Fails, _, _>(schema::text, |_text, _ctx| {
                Err(HandlerError::new("nope"))
            })
            .build()
            .expect("build");
        assert!(router.lookup("always.fails").is_some());
    }
}
