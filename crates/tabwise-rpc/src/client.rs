//! The typed calling convention on the sending side.
//!
//! A [`Client`] turns an [`Operation`] and an input value into one envelope
//! round-trip: fresh correlation id, resolve the active tab, transmit the
//! tagged frame, then await the matching reply through the call tracker.
//! Status 200 decodes into the operation's output type; any other status
//! rejects with the full response envelope so callers can branch on the
//! failure kind. Channel failures and timeouts never produce an envelope at
//! all and are reported as their own error variants.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use tabwise_wire::{RequestEnvelope, RequestFrame, ResponseEnvelope};

use crate::channel::{ChannelError, MessageChannel};
use crate::route::Operation;
use crate::tracker::{CallTracker, WaitError};

/// Tracing target for outbound calls.
pub(crate) const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Default time a call may spend awaiting its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a call may await its reply before rejecting.
    ///
    /// Without this bound a torn-down destination would leave the call
    /// pending forever; expiry clears the pending entry and any late reply
    /// is dropped as an unknown id.
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Failure modes of a single call, discriminable by kind.
#[derive(Debug, Error)]
pub enum CallError {
    /// The channel could not deliver the request; no envelope round-trip
    /// occurred.
    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),

    /// No reply arrived in time.
    #[error("call timed out after {timeout:?}")]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Reply routing stopped while the call was pending.
    #[error("reply routing stopped while the call was pending")]
    RoutingStopped,

    /// The destination answered with a non-success envelope.
    #[error("call rejected with status {}", .rejection.status())]
    Rejected {
        /// The full response envelope, preserving status, message, and
        /// issues for the caller to branch on.
        rejection: ResponseEnvelope,
    },

    /// The call input could not be serialised to a wire value.
    #[error("failed to encode call input: {0}")]
    EncodeInput(#[source] serde_json::Error),

    /// The success payload did not decode into the operation's output type.
    #[error("failed to decode call payload: {0}")]
    DecodePayload(#[source] serde_json::Error),
}

impl CallError {
    /// The response envelope behind a rejection, when one exists.
    #[must_use]
    pub const fn rejection(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Rejected { rejection } => Some(rejection),
            _ => None,
        }
    }
}

/// Typed caller over one message channel.
pub struct Client {
    channel: Arc<dyn MessageChannel>,
    tracker: CallTracker,
    config: ClientConfig,
}

impl Client {
    /// Creates a client with default configuration.
    #[must_use]
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self::with_config(channel, ClientConfig::default())
    }

    /// Creates a client with explicit configuration.
    #[must_use]
    pub fn with_config(channel: Arc<dyn MessageChannel>, config: ClientConfig) -> Self {
        Self {
            channel,
            tracker: CallTracker::new(),
            config,
        }
    }

    /// Performs one call for a typed operation.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] naming the failure kind: channel failures and
    /// timeouts carry no envelope; every dispatched failure carries the full
    /// rejection envelope.
    pub fn call<O: Operation>(&self, input: &O::Input) -> Result<O::Output, CallError> {
        let tab = self
            .channel
            .active_tab()
            .ok_or(ChannelError::NoActiveTab)?;

        let input_value = serde_json::to_value(input).map_err(CallError::EncodeInput)?;
        let pending = self.tracker.register();
        let envelope = RequestEnvelope {
            correlation_id: pending.id(),
            route: O::PATH.to_owned(),
            input: input_value,
        };
        let frame =
            serde_json::to_value(RequestFrame::new(envelope)).map_err(CallError::EncodeInput)?;

        debug!(
            target: CLIENT_TARGET,
            route = O::PATH,
            id = %pending.id(),
            %tab,
            "issuing call"
        );

        if let Err(error) = self.channel.send(tab, frame, self.tracker.reply_sink()) {
            pending.discard();
            return Err(error.into());
        }

        let response = pending
            .wait(self.config.call_timeout)
            .map_err(|error| match error {
                WaitError::TimedOut { timeout } => CallError::TimedOut { timeout },
                WaitError::TrackerStopped => CallError::RoutingStopped,
            })?;

        match response {
            ResponseEnvelope::Success { payload, .. } => {
                serde_json::from_value(payload).map_err(CallError::DecodePayload)
            }
            rejection => Err(CallError::Rejected { rejection }),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
