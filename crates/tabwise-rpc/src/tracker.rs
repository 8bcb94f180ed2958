//! Pending-call bookkeeping on the caller's side.
//!
//! All replies for a client arrive on one shared, unordered stream. The
//! tracker owns the table mapping correlation ids to the one-shot waiters of
//! in-flight calls and runs a demultiplexer thread that routes each incoming
//! reply purely by id. Every entry is removed exactly once — on its matching
//! response, on channel-level send failure, or on timeout — and a reply for
//! an id that is unknown (or already completed) is dropped with a log rather
//! than resolving anything twice.
//!
//! The tracker is an owned object, not ambient state: independent clients on
//! independent channels each carry their own and cannot cross-talk.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use tabwise_wire::{CorrelationId, ResponseEnvelope, ResponseFrame};

use crate::channel::ReplySink;

/// Tracing target for reply correlation.
pub(crate) const TRACKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::tracker");

type PendingTable = Arc<Mutex<HashMap<CorrelationId, Sender<ResponseEnvelope>>>>;

/// Failure waiting on a pending call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// No reply arrived within the allowed time; the entry was cleared.
    #[error("no reply within {timeout:?}")]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The tracker stopped before a reply could be routed.
    #[error("reply routing stopped before a response arrived")]
    TrackerStopped,
}

/// Owned pending-call table plus its reply demultiplexer.
#[derive(Debug)]
pub struct CallTracker {
    pending: PendingTable,
    sink: Sender<Value>,
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTracker {
    /// Creates a tracker and starts its demultiplexer thread.
    ///
    /// The thread exits once every clone of the reply sink has been dropped.
    #[must_use]
    pub fn new() -> Self {
        let (sink, replies) = mpsc::channel();
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let table = Arc::clone(&pending);
        thread::spawn(move || run_demux(&replies, &table));
        Self { pending, sink }
    }

    /// Sink handed to the channel so replies reach this tracker.
    #[must_use]
    pub fn reply_sink(&self) -> ReplySink {
        self.sink.clone()
    }

    /// Registers a fresh call and returns its waiter.
    #[must_use]
    pub fn register(&self) -> PendingCall {
        let id = CorrelationId::fresh();
        let (waiter, receiver) = mpsc::channel();
        lock_table(&self.pending).insert(id, waiter);
        PendingCall {
            id,
            receiver,
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Waiter for one registered call.
#[derive(Debug)]
pub struct PendingCall {
    id: CorrelationId,
    receiver: Receiver<ResponseEnvelope>,
    pending: PendingTable,
}

impl PendingCall {
    /// Correlation id this call was registered under.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// Blocks until the matching reply arrives or the timeout elapses.
    ///
    /// On timeout the pending entry is cleared, so a late reply is treated
    /// like any other unknown id and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::TimedOut`] after the timeout, or
    /// [`WaitError::TrackerStopped`] if reply routing shut down first.
    pub fn wait(self, timeout: Duration) -> Result<ResponseEnvelope, WaitError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                self.discard();
                Err(WaitError::TimedOut { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.discard();
                Err(WaitError::TrackerStopped)
            }
        }
    }

    /// Removes the pending entry without resolving it.
    ///
    /// Used when the send itself failed and no reply can ever arrive.
    pub fn discard(&self) {
        lock_table(&self.pending).remove(&self.id);
    }
}

fn run_demux(replies: &Receiver<Value>, pending: &PendingTable) {
    while let Ok(message) = replies.recv() {
        let frame: ResponseFrame = match serde_json::from_value(message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(target: TRACKER_TARGET, %error, "dropping unparseable reply");
                continue;
            }
        };
        settle(pending, frame.envelope);
    }
    debug!(target: TRACKER_TARGET, "reply demultiplexer stopped");
}

/// Routes one response to its waiter; at most one resolution per id.
fn settle(pending: &PendingTable, response: ResponseEnvelope) {
    let id = response.correlation_id();
    let Some(waiter) = lock_table(pending).remove(&id) else {
        debug!(
            target: TRACKER_TARGET,
            %id,
            "ignoring reply for unknown or already-completed call"
        );
        return;
    };
    if waiter.send(response).is_err() {
        // The caller raced away (typically a timeout between removal and
        // delivery); the entry is already gone, so nothing resolves twice.
        debug!(target: TRACKER_TARGET, %id, "caller gave up before the reply was routed");
    }
}

/// The table stays usable even if a panicking thread poisoned the lock.
fn lock_table(
    pending: &PendingTable,
) -> MutexGuard<'_, HashMap<CorrelationId, Sender<ResponseEnvelope>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame_for(response: &ResponseEnvelope) -> Value {
        serde_json::to_value(ResponseFrame::new(response.clone())).expect("encode frame")
    }

    #[test]
    fn routes_reply_to_matching_waiter() {
        let tracker = CallTracker::new();
        let call = tracker.register();
        let response = ResponseEnvelope::success(call.id(), json!("ok"));
        tracker.reply_sink().send(frame_for(&response)).expect("send");
        assert_eq!(call.wait(Duration::from_secs(1)).expect("wait"), response);
    }

    #[test]
    fn interleaved_replies_resolve_by_id_not_order() {
        let tracker = CallTracker::new();
        let first = tracker.register();
        let second = tracker.register();

        let first_response = ResponseEnvelope::success(first.id(), json!(1));
        let second_response = ResponseEnvelope::success(second.id(), json!(2));

        // Deliver in reverse registration order.
        let sink = tracker.reply_sink();
        sink.send(frame_for(&second_response)).expect("send");
        sink.send(frame_for(&first_response)).expect("send");

        assert_eq!(
            first.wait(Duration::from_secs(1)).expect("first"),
            first_response
        );
        assert_eq!(
            second.wait(Duration::from_secs(1)).expect("second"),
            second_response
        );
    }

    #[test]
    fn duplicate_reply_is_ignored() {
        let tracker = CallTracker::new();
        let call = tracker.register();
        let response = ResponseEnvelope::success(call.id(), json!("first"));
        let duplicate = ResponseEnvelope::success(call.id(), json!("second"));

        let sink = tracker.reply_sink();
        sink.send(frame_for(&response)).expect("send");
        assert_eq!(call.wait(Duration::from_secs(1)).expect("wait"), response);

        // The id has completed; a second reply must resolve nothing and a
        // later call must be unaffected.
        sink.send(frame_for(&duplicate)).expect("send duplicate");
        let later = tracker.register();
        let later_response = ResponseEnvelope::success(later.id(), json!("later"));
        sink.send(frame_for(&later_response)).expect("send later");
        assert_eq!(
            later.wait(Duration::from_secs(1)).expect("later"),
            later_response
        );
    }

    #[test]
    fn timeout_clears_the_pending_entry() {
        let tracker = CallTracker::new();
        let call = tracker.register();
        let id = call.id();
        let error = call.wait(Duration::from_millis(10)).expect_err("timeout");
        assert!(matches!(error, WaitError::TimedOut { .. }));

        // A reply after expiry is an unknown id; nothing panics and later
        // calls still resolve.
        let late = ResponseEnvelope::success(id, json!("late"));
        tracker.reply_sink().send(frame_for(&late)).expect("send late");
        let next = tracker.register();
        let next_response = ResponseEnvelope::success(next.id(), json!("next"));
        tracker
            .reply_sink()
            .send(frame_for(&next_response))
            .expect("send next");
        assert_eq!(
            next.wait(Duration::from_secs(1)).expect("next"),
            next_response
        );
    }

    #[test]
    fn discard_removes_entry_without_resolution() {
        let tracker = CallTracker::new();
        let call = tracker.register();
        let id = call.id();
        call.discard();
        let response = ResponseEnvelope::success(id, json!("ignored"));
        tracker.reply_sink().send(frame_for(&response)).expect("send");
        // Deliver a follow-up call to prove the demultiplexer survived.
        let next = tracker.register();
        let next_response = ResponseEnvelope::success(next.id(), json!("next"));
        tracker
            .reply_sink()
            .send(frame_for(&next_response))
            .expect("send next");
        assert_eq!(
            next.wait(Duration::from_secs(1)).expect("next"),
            next_response
        );
    }

    #[test]
    fn unparseable_reply_does_not_stop_routing() {
        let tracker = CallTracker::new();
        let call = tracker.register();
        let sink = tracker.reply_sink();
        sink.send(json!({ "tabwise": "not an envelope" }))
            .expect("send junk");
        let response = ResponseEnvelope::success(call.id(), json!("ok"));
        sink.send(frame_for(&response)).expect("send real");
        assert_eq!(call.wait(Duration::from_secs(1)).expect("wait"), response);
    }
}
