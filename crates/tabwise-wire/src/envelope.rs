//! Request and response envelopes.
//!
//! The request shape mirrors what the popup-side caller produces; the
//! response is one of four variants discriminated by a numeric `status`
//! field. Responses deserialise via an intermediate raw shape so that the
//! status code and the variant-specific fields are checked explicitly rather
//! than trusted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::correlation::CorrelationId;
use crate::issue::Issue;

/// A routed call travelling from the caller to the handling context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Identifier echoed by whichever response answers this request.
    #[serde(rename = "queryId")]
    pub correlation_id: CorrelationId,
    /// Full dotted route path, for example `page.details`.
    pub route: String,
    /// Untyped input; validated by the route's schema at dispatch time.
    pub input: Value,
}

impl RequestEnvelope {
    /// Builds an envelope with a fresh correlation id.
    #[must_use]
    pub fn new(route: impl Into<String>, input: Value) -> Self {
        Self {
            correlation_id: CorrelationId::fresh(),
            route: route.into(),
            input,
        }
    }
}

/// A reply travelling back to the caller.
///
/// Every variant echoes the correlation id of the request it answers. The
/// dispatcher produces exactly one of these per inbound envelope; nothing
/// else ever crosses the channel in the response direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse", into = "RawResponse")]
pub enum ResponseEnvelope {
    /// The handler ran to completion; `payload` is its serialised output.
    Success {
        /// Correlation id of the answered request.
        correlation_id: CorrelationId,
        /// Handler output as a plain JSON value.
        payload: Value,
    },
    /// The input failed the route's schema; the handler never ran.
    InvalidInput {
        /// Correlation id of the answered request.
        correlation_id: CorrelationId,
        /// Every violation found, each with its field path.
        issues: Vec<Issue>,
    },
    /// The dotted path did not resolve to a route.
    NotFound {
        /// Correlation id of the answered request.
        correlation_id: CorrelationId,
        /// Diagnostic naming the requested path.
        message: String,
    },
    /// The handler failed after validation succeeded.
    Failed {
        /// Correlation id of the answered request.
        correlation_id: CorrelationId,
        /// Raw handler error, preserved for upstream logging.
        error: Value,
    },
}

impl ResponseEnvelope {
    /// HTTP-style status code carried on the wire for this variant.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Success { .. } => 200,
            Self::InvalidInput { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Failed { .. } => 500,
        }
    }

    /// Correlation id echoed from the originating request.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Success { correlation_id, .. }
            | Self::InvalidInput { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Failed { correlation_id, .. } => *correlation_id,
        }
    }

    /// Builds a success response.
    #[must_use]
    pub const fn success(correlation_id: CorrelationId, payload: Value) -> Self {
        Self::Success {
            correlation_id,
            payload,
        }
    }

    /// Builds a validation-failure response.
    #[must_use]
    pub const fn invalid_input(correlation_id: CorrelationId, issues: Vec<Issue>) -> Self {
        Self::InvalidInput {
            correlation_id,
            issues,
        }
    }

    /// Builds a route-not-found response.
    #[must_use]
    pub fn not_found(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self::NotFound {
            correlation_id,
            message: message.into(),
        }
    }

    /// Builds a handler-failure response.
    #[must_use]
    pub const fn failed(correlation_id: CorrelationId, error: Value) -> Self {
        Self::Failed {
            correlation_id,
            error,
        }
    }
}

/// Errors converting a raw wire value into a typed response envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `status` field named no known variant.
    #[error("unknown response status {status}")]
    UnknownStatus {
        /// Status code found on the wire.
        status: u16,
    },

    /// A field required by the variant for this status was absent.
    #[error("response with status {status} is missing field '{field}'")]
    MissingField {
        /// Status code found on the wire.
        status: u16,
        /// Name of the absent field.
        field: &'static str,
    },

    /// The `error` field of a 400 response was not a list of issues.
    #[error("malformed validation issues: {source}")]
    MalformedIssues {
        /// Underlying deserialisation failure.
        #[source]
        source: serde_json::Error,
    },
}

/// On-the-wire response shape, prior to status-specific validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawResponse {
    status: u16,
    #[serde(rename = "queryId")]
    query_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl TryFrom<RawResponse> for ResponseEnvelope {
    type Error = DecodeError;

    fn try_from(raw: RawResponse) -> Result<Self, DecodeError> {
        let correlation_id = raw.query_id;
        match raw.status {
            200 => {
                let payload = raw.payload.ok_or(DecodeError::MissingField {
                    status: 200,
                    field: "payload",
                })?;
                Ok(Self::success(correlation_id, payload))
            }
            400 => {
                let error = raw.error.ok_or(DecodeError::MissingField {
                    status: 400,
                    field: "error",
                })?;
                let issues: Vec<Issue> = serde_json::from_value(error)
                    .map_err(|source| DecodeError::MalformedIssues { source })?;
                Ok(Self::invalid_input(correlation_id, issues))
            }
            404 => {
                let message = raw.message.ok_or(DecodeError::MissingField {
                    status: 404,
                    field: "message",
                })?;
                Ok(Self::not_found(correlation_id, message))
            }
            500 => {
                let error = raw.error.ok_or(DecodeError::MissingField {
                    status: 500,
                    field: "error",
                })?;
                Ok(Self::failed(correlation_id, error))
            }
            status => Err(DecodeError::UnknownStatus { status }),
        }
    }
}

impl From<ResponseEnvelope> for RawResponse {
    fn from(envelope: ResponseEnvelope) -> Self {
        let status = envelope.status();
        match envelope {
            ResponseEnvelope::Success {
                correlation_id,
                payload,
            } => Self {
                status,
                query_id: correlation_id,
                payload: Some(payload),
                message: None,
                error: None,
            },
            ResponseEnvelope::InvalidInput {
                correlation_id,
                issues,
            } => Self {
                status,
                query_id: correlation_id,
                payload: None,
                message: None,
                // Issue serialisation cannot fail: both fields are strings.
                error: serde_json::to_value(issues).ok(),
            },
            ResponseEnvelope::NotFound {
                correlation_id,
                message,
            } => Self {
                status,
                query_id: correlation_id,
                payload: None,
                message: Some(message),
                error: None,
            },
            ResponseEnvelope::Failed {
                correlation_id,
                error,
            } => Self {
                status,
                query_id: correlation_id,
                payload: None,
                message: None,
                error: Some(error),
            },
        }
    }
}
