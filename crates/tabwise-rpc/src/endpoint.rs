//! The receiving-side serve loop.
//!
//! An endpoint drains one tab's inbox in a background thread. Messages that
//! are not protocol frames are skipped; frames that cannot be parsed far
//! enough to yield a correlation id are dropped with a log, because no
//! addressable reply is possible. Everything else is dispatched on its own
//! thread — handlers may therefore run concurrently — and answered through
//! the delivery's reply sink.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use tabwise_wire::{RequestFrame, ResponseFrame, is_protocol_frame};

use crate::channel::{Delivery, TabInbox};
use crate::dispatch::Dispatcher;

/// Tracing target for endpoint lifecycle and frame handling.
pub(crate) const ENDPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");

/// Handle to a running endpoint's serve thread.
///
/// The serve loop ends once the tab is detached from its channel and the
/// in-flight deliveries have drained; `join` then returns.
#[derive(Debug)]
pub struct EndpointHandle {
    handle: Option<JoinHandle<()>>,
}

impl EndpointHandle {
    /// Waits for the serve loop to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(target: ENDPOINT_TARGET, "endpoint thread panicked");
        }
    }
}

/// Starts serving a tab's inbox with the given dispatcher and context.
pub fn spawn_endpoint<C>(
    inbox: TabInbox,
    dispatcher: Arc<Dispatcher<C>>,
    ctx: Arc<C>,
) -> EndpointHandle
where
    C: Send + Sync + 'static,
{
    let handle = thread::spawn(move || run_serve_loop(&inbox, &dispatcher, &ctx));
    EndpointHandle {
        handle: Some(handle),
    }
}

fn run_serve_loop<C>(inbox: &TabInbox, dispatcher: &Arc<Dispatcher<C>>, ctx: &Arc<C>)
where
    C: Send + Sync + 'static,
{
    debug!(target: ENDPOINT_TARGET, "endpoint serving");
    while let Some(delivery) = inbox.next_delivery() {
        if !is_protocol_frame(&delivery.message) {
            debug!(target: ENDPOINT_TARGET, "skipping unrelated channel message");
            continue;
        }
        let frame: RequestFrame = match serde_json::from_value(delivery.message) {
            Ok(frame) => frame,
            Err(error) => {
                // Without a parsed correlation id there is nothing to
                // address a reply to.
                warn!(target: ENDPOINT_TARGET, %error, "dropping malformed protocol frame");
                continue;
            }
        };

        let dispatcher = Arc::clone(dispatcher);
        let ctx = Arc::clone(ctx);
        let reply_to = delivery.reply_to;
        thread::spawn(move || {
            let response = dispatcher.dispatch(&frame.envelope, &ctx);
            match serde_json::to_value(ResponseFrame::new(response)) {
                Ok(reply) => {
                    if reply_to.send(reply).is_err() {
                        debug!(
                            target: ENDPOINT_TARGET,
                            id = %frame.envelope.correlation_id,
                            "caller stopped waiting before the reply was sent"
                        );
                    }
                }
                Err(error) => {
                    warn!(target: ENDPOINT_TARGET, %error, "failed to encode reply frame");
                }
            }
        });
    }
    debug!(target: ENDPOINT_TARGET, "endpoint stopped");
}
