//! The messaging-channel seam between execution contexts.
//!
//! The browser delivers extension messages by tab: a sender names a
//! destination tab, ships one plain JSON value, and may receive one reply
//! through a callback. [`MessageChannel`] captures exactly that contract —
//! and nothing more — so the calling convention above it works identically
//! against the real messaging API and against [`InProcessChannel`], the
//! in-repo implementation used by the tests and the service wiring.
//!
//! Only `serde_json::Value` crosses the channel. No Rust type survives the
//! boundary, which is why the receiving side re-validates everything.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identity of a destination context (the tab hosting a content script).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(u32);

impl TabId {
    /// Wraps a raw tab number.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tab {}", self.0)
    }
}

/// Where a receiver posts its single reply for a delivery.
pub type ReplySink = Sender<Value>;

/// Failures of the channel itself, as opposed to dispatched-but-erroring
/// calls: no envelope ever crossed the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// No destination context exists to receive the call.
    #[error("no active tab to receive the call")]
    NoActiveTab,

    /// The named destination has gone away.
    #[error("{tab} is no longer attached")]
    Disconnected {
        /// The unreachable destination.
        tab: TabId,
    },
}

/// Address-based send/receive between isolated contexts.
pub trait MessageChannel: Send + Sync {
    /// Resolves the currently active destination, if any.
    fn active_tab(&self) -> Option<TabId>;

    /// Delivers one message to one destination with a reply sink.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the destination cannot be reached;
    /// this is reported immediately, never as a response envelope.
    fn send(&self, tab: TabId, message: Value, reply_to: ReplySink) -> Result<(), ChannelError>;
}

/// One message handed to a receiving context.
#[derive(Debug)]
pub struct Delivery {
    /// The raw channel payload.
    pub message: Value,
    /// Sink for this delivery's single reply.
    pub reply_to: ReplySink,
}

/// Inbox of deliveries for one attached tab.
#[derive(Debug)]
pub struct TabInbox {
    receiver: Receiver<Delivery>,
}

impl TabInbox {
    /// Blocks for the next delivery; `None` once the tab is detached and the
    /// in-flight sends have drained.
    #[must_use]
    pub fn next_delivery(&self) -> Option<Delivery> {
        self.receiver.recv().ok()
    }
}

struct HubState {
    tabs: HashMap<TabId, Sender<Delivery>>,
    active: Option<TabId>,
    next_tab: u32,
}

/// In-process channel standing in for the browser messaging API.
///
/// Contexts attach as tabs and drain their own inbox; the most recently
/// attached tab becomes the active destination, as a freshly opened tab
/// would be. Detaching a tab models tearing the page down: later sends fail
/// at the channel level.
pub struct InProcessChannel {
    state: Mutex<HubState>,
}

impl Default for InProcessChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessChannel {
    /// Creates a channel with no attached tabs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                tabs: HashMap::new(),
                active: None,
                next_tab: 1,
            }),
        }
    }

    /// Attaches a new tab, making it the active destination.
    pub fn attach_tab(&self) -> (TabId, TabInbox) {
        let (sender, receiver) = mpsc::channel();
        let mut state = self.state();
        let tab = TabId::new(state.next_tab);
        state.next_tab += 1;
        state.tabs.insert(tab, sender);
        state.active = Some(tab);
        (tab, TabInbox { receiver })
    }

    /// Detaches a tab; pending inbox deliveries still drain.
    pub fn detach_tab(&self, tab: TabId) {
        let mut state = self.state();
        state.tabs.remove(&tab);
        if state.active == Some(tab) {
            state.active = None;
        }
    }

    /// Marks an attached tab as the active destination.
    ///
    /// Returns false when the tab is not attached.
    pub fn set_active(&self, tab: TabId) -> bool {
        let mut state = self.state();
        if state.tabs.contains_key(&tab) {
            state.active = Some(tab);
            true
        } else {
            false
        }
    }

    /// Recovers the registry even if a sender panicked mid-update; the map
    /// itself is always left consistent.
    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageChannel for InProcessChannel {
    fn active_tab(&self) -> Option<TabId> {
        self.state().active
    }

    fn send(&self, tab: TabId, message: Value, reply_to: ReplySink) -> Result<(), ChannelError> {
        let sender = self
            .state()
            .tabs
            .get(&tab)
            .cloned()
            .ok_or(ChannelError::Disconnected { tab })?;
        sender
            .send(Delivery { message, reply_to })
            .map_err(|_| ChannelError::Disconnected { tab })
    }
}

impl fmt::Debug for InProcessChannel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        formatter
            .debug_struct("InProcessChannel")
            .field("tabs", &state.tabs.len())
            .field("active", &state.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn newest_tab_is_active() {
        let channel = InProcessChannel::new();
        assert_eq!(channel.active_tab(), None);
        let (first, _first_inbox) = channel.attach_tab();
        assert_eq!(channel.active_tab(), Some(first));
        let (second, _second_inbox) = channel.attach_tab();
        assert_eq!(channel.active_tab(), Some(second));
        assert!(channel.set_active(first));
        assert_eq!(channel.active_tab(), Some(first));
    }

    #[test]
    fn delivers_message_to_named_tab() {
        let channel = InProcessChannel::new();
        let (tab, inbox) = channel.attach_tab();
        let (reply_to, _replies) = mpsc::channel();
        channel
            .send(tab, json!({ "ping": 1 }), reply_to)
            .expect("send");
        let delivery = inbox.next_delivery().expect("delivery");
        assert_eq!(delivery.message, json!({ "ping": 1 }));
    }

    #[test]
    fn send_to_detached_tab_fails_at_channel_level() {
        let channel = InProcessChannel::new();
        let (tab, inbox) = channel.attach_tab();
        drop(inbox);
        channel.detach_tab(tab);
        let (reply_to, _replies) = mpsc::channel();
        let error = channel
            .send(tab, json!(null), reply_to)
            .expect_err("detached");
        assert_eq!(error, ChannelError::Disconnected { tab });
        assert_eq!(channel.active_tab(), None);
    }

    #[test]
    fn reply_sink_reaches_the_sender() {
        let channel = InProcessChannel::new();
        let (tab, inbox) = channel.attach_tab();
        let (reply_to, replies) = mpsc::channel();
        channel.send(tab, json!("hello"), reply_to).expect("send");
        let delivery = inbox.next_delivery().expect("delivery");
        delivery.reply_to.send(json!("world")).expect("reply");
        assert_eq!(replies.recv().expect("receive reply"), json!("world"));
    }
}
