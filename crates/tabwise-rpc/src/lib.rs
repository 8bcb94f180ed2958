//! Typed request/response calls between the extension's isolated contexts.
//!
//! The popup and the content script run in separate execution contexts joined
//! only by an untyped message channel that carries plain JSON. This crate
//! supplies the call/dispatch mechanism layered over that channel:
//!
//! - [`schema`] validates untrusted inputs at the receiving side, reporting
//!   every violation with its field path;
//! - [`Route`] pairs a validator with a handler, and [`RouterBuilder`]
//!   flattens a tree of named routes into a read-only registry addressed by
//!   dotted path;
//! - [`Dispatcher`] resolves, validates, executes, and always replies with a
//!   typed envelope — it never lets a failure escape as anything else;
//! - [`MessageChannel`] is the seam to the browser messaging API, with
//!   [`InProcessChannel`] standing in for it inside this repository;
//! - the endpoint serve loop ([`spawn_endpoint`]) drains a tab's inbox and
//!   replies through each delivery's reply sink;
//! - [`Client`] provides the typed calling convention: one [`Operation`]
//!   type names the path and fixes the input and output types for both
//!   sides, and a [`CallTracker`] matches interleaved replies to their
//!   pending calls purely by correlation id.
//!
//! Calls are single-request/single-response. There is no streaming, no
//! cancellation across the wire, and no multiplexed transport; a call either
//! resolves with the handler's output, rejects with the full response
//! envelope, or fails at the channel level without any envelope round-trip.

pub mod schema;

mod channel;
mod client;
mod dispatch;
mod endpoint;
mod route;
mod router;
mod tracker;

pub use channel::{ChannelError, Delivery, InProcessChannel, MessageChannel, ReplySink, TabId, TabInbox};
pub use client::{CallError, Client, ClientConfig, DEFAULT_CALL_TIMEOUT};
pub use dispatch::Dispatcher;
pub use endpoint::{EndpointHandle, spawn_endpoint};
pub use route::{HandlerError, Operation, Route};
pub use router::{Router, RouterBuildError, RouterBuilder};
pub use tracker::{CallTracker, PendingCall, WaitError};
