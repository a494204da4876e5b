use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single outbound call to one of the external services
#[derive(Debug, Error)]
pub enum ApiError {
    /// Provider answered 429 Too Many Requests
    #[error("{service} rate limit exceeded")]
    RateLimited { service: &'static str },

    #[error("{service} API error: {status} - {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("request to {service} failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Turn a non-success response into the matching error variant
    pub(crate) async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ApiError::RateLimited { service };
        }

        let body = response.text().await.unwrap_or_default();
        ApiError::Status {
            service,
            status,
            body,
        }
    }
}
