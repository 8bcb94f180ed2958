//! Wire vocabulary shared by both ends of the extension messaging channel.
//!
//! The popup and the content script exchange plain JSON over the browser's
//! messaging API. This crate defines the envelope types that travel across
//! that boundary: a [`RequestEnvelope`] identifying a route and carrying an
//! untyped input value, and a [`ResponseEnvelope`] discriminated by a numeric
//! `status` field. Both are wrapped in a tagged frame (the [`ENVELOPE_TAG`]
//! key) so receivers can cheaply recognise protocol traffic on a channel
//! shared with unrelated messages.
//!
//! Decoding is explicit and validating. The channel strips all type
//! information, so a raw value is first deserialised into an intermediate
//! shape and then converted with status-specific checks; an unknown status or
//! a missing variant field is a [`DecodeError`], never a silently mis-parsed
//! variant.

mod correlation;
mod envelope;
mod frame;
mod issue;

pub use correlation::CorrelationId;
pub use envelope::{DecodeError, RequestEnvelope, ResponseEnvelope};
pub use frame::{ENVELOPE_TAG, RequestFrame, ResponseFrame, is_protocol_frame};
pub use issue::Issue;
