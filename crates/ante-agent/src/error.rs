use thiserror::Error;

use crate::types::ProviderKind;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} response had no usable content: {message}")]
    Response {
        provider: ProviderKind,
        message: String,
    },

    #[error("failed to decode provider response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The reply arrived but the caller's decoder refused it.
    #[error("reply rejected: {0}")]
    Rejected(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider {0} is not configured")]
    NotConfigured(ProviderKind),

    #[error("{provider} credentials missing: set {env}")]
    MissingCredentials { provider: ProviderKind, env: String },

    #[error("{context}: gave up after {attempts} attempts: {last}")]
    Exhausted {
        context: String,
        attempts: u32,
        #[source]
        last: Box<AgentError>,
    },
}

pub type Result<T> = std::result::Result<T, AgentError>;
