//! Correlation identifiers linking responses to their originating requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique token matching a response to its request on an unordered channel.
///
/// Replies on the shared messaging channel may interleave arbitrarily, so the
/// caller never assumes ordering and matches purely by this identifier. Ids
/// are version 4 UUIDs, which makes collisions between concurrently in-flight
/// calls on the same channel vanishingly unlikely without any coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh identifier for a new call.
    #[must_use]
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(CorrelationId::fresh(), CorrelationId::fresh());
    }

    #[test]
    fn serialises_as_plain_string() {
        let id = CorrelationId::fresh();
        let value = serde_json::to_value(id).expect("serialise id");
        assert!(value.is_string());
    }

    #[test]
    fn round_trips_through_json() {
        let id = CorrelationId::fresh();
        let text = serde_json::to_string(&id).expect("serialise id");
        let back: CorrelationId = serde_json::from_str(&text).expect("parse id");
        assert_eq!(id, back);
    }
}
