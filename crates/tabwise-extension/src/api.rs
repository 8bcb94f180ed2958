//! Client for the answer service.
//!
//! The popup posts the assembled prompt and page content to an HTTP
//! endpoint and receives either an answer or a coded fault. The wire shape
//! is `{"data": {"answer": …} | null, "error": {"message", "code"} | null}`;
//! the coded faults map onto typed errors so callers can react to rate
//! limiting, oversized content, authentication problems, and exhausted
//! quotas without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use tabwise_config::ApiSettings;

/// Tracing target for answer-service requests.
pub(crate) const API_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::api");

/// One question shipped to the answer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRequest {
    /// Assembled instruction and question text.
    pub prompt: String,
    /// Page content (or selection) the answer should draw on.
    pub content: String,
}

/// Typed failures of an answer request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service is rate limiting requests; retry later.
    #[error("answer service is rate limiting requests: {message}")]
    RateLimited {
        /// Service-provided explanation.
        message: String,
    },

    /// The page content exceeds what the model can take in one request.
    #[error("page content is too long for the answer service: {message}")]
    ContextTooLong {
        /// Service-provided explanation.
        message: String,
    },

    /// The request was not authenticated or not authorised.
    #[error("answer service rejected the credentials: {message}")]
    Unauthorised {
        /// Service-provided explanation.
        message: String,
    },

    /// The account's quota is used up.
    #[error("answer service quota is exhausted: {message}")]
    QuotaExhausted {
        /// Service-provided explanation.
        message: String,
    },

    /// The service reported a fault this client has no specific handling
    /// for.
    #[error("answer service reported '{code}': {message}")]
    Service {
        /// Service-provided fault code.
        code: String,
        /// Service-provided explanation.
        message: String,
    },

    /// The service answered with neither data nor a fault.
    #[error("answer service returned an empty result")]
    EmptyResult,

    /// The response was not a success and carried no parseable fault.
    #[error("answer service returned HTTP {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("answer service response was malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The request never completed at the transport level.
    #[error("failed to reach the answer service: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Seam over the answer service so orchestration is testable offline.
pub trait AnswerApi: Send + Sync {
    /// Asks one question, returning the answer text.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] naming the failure kind.
    fn ask(&self, request: &AnswerRequest) -> Result<String, ApiError>;
}

/// Response body of the answer endpoint.
#[derive(Debug, Deserialize)]
struct AnswerResponse {
    data: Option<AnswerData>,
    error: Option<AnswerFault>,
}

#[derive(Debug, Deserialize)]
struct AnswerData {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct AnswerFault {
    message: String,
    code: String,
}

impl AnswerFault {
    fn into_error(self) -> ApiError {
        let Self { message, code } = self;
        match code.as_str() {
            "rate-limited" => ApiError::RateLimited { message },
            "context-too-long" => ApiError::ContextTooLong { message },
            "unauthorised" => ApiError::Unauthorised { message },
            "quota-exhausted" => ApiError::QuotaExhausted { message },
            _ => ApiError::Service { code, message },
        }
    }
}

/// HTTP implementation of [`AnswerApi`].
#[derive(Debug)]
pub struct HttpAnswerApi {
    client: reqwest::blocking::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpAnswerApi {
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: None,
        })
    }

    /// Attaches a bearer key sent with every request.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl AnswerApi for HttpAnswerApi {
    fn ask(&self, request: &AnswerRequest) -> Result<String, ApiError> {
        debug!(
            target: API_TARGET,
            endpoint = %self.endpoint,
            content_bytes = request.content.len(),
            "asking the answer service"
        );

        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send()?;
        let status = response.status();
        let body = response.text()?;

        let parsed: Result<AnswerResponse, serde_json::Error> = serde_json::from_str(&body);
        match parsed {
            Ok(AnswerResponse {
                error: Some(fault), ..
            }) => Err(fault.into_error()),
            Ok(AnswerResponse {
                data: Some(data), ..
            }) if status.is_success() => Ok(data.answer),
            Ok(_) if status.is_success() => Err(ApiError::EmptyResult),
            Ok(_) => Err(ApiError::Http {
                status: status.as_u16(),
            }),
            Err(source) if status.is_success() => Err(ApiError::Malformed(source)),
            Err(_) => Err(ApiError::Http {
                status: status.as_u16(),
            }),
        }
    }
}
