use thiserror::Error;

use crate::validate::ValidationError;

/// Errors returned by gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The candidate image failed pre-flight validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No access token for the remote service is configured.
    #[error("remote service access token not configured")]
    Unconfigured,

    /// The remote service answered with a non-success status.
    #[error("remote service returned HTTP {status}: {details}")]
    Remote { status: u16, details: String },

    /// The remote service answered with something that is not the JSON
    /// shape it promised.
    #[error("unexpected response from remote service (HTTP {status}): {snippet}")]
    MalformedResponse { status: u16, snippet: String },

    /// A required workflow parameter was empty.
    #[error("missing required parameter: {0}")]
    MissingParams(&'static str),

    /// Network-level request failure with context. Request timeouts
    /// surface here; they are never retried.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },
}

impl GatewayError {
    /// HTTP status code the gateway answers with for this error.
    ///
    /// Remote and malformed-response errors forward the remote status;
    /// everything caller-side maps to 400, everything gateway-side to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) | GatewayError::MissingParams(_) => 400,
            GatewayError::Unconfigured | GatewayError::Network { .. } => 500,
            GatewayError::Remote { status, .. }
            | GatewayError::MalformedResponse { status, .. } => *status,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GatewayError>;
