// Error types for the OpenStack backend

use nimbus_common::NimbusError;

/// Errors that can occur while talking to OpenStack APIs
#[derive(Debug, thiserror::Error)]
pub enum OpenStackError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("No '{0}' endpoint in the service catalog")]
    MissingEndpoint(String),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl OpenStackError {
    pub fn status(&self) -> Option<u16> {
        match self {
            OpenStackError::RequestFailed { status, .. } => Some(*status),
            OpenStackError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<OpenStackError> for NimbusError {
    fn from(value: OpenStackError) -> Self {
        match value {
            OpenStackError::AuthFailed(msg) => NimbusError::provider(401, msg),
            OpenStackError::MissingEndpoint(service) => {
                NimbusError::Config(format!("no '{}' endpoint in the service catalog", service))
            }
            OpenStackError::RequestFailed { status, body } => NimbusError::provider(status, body),
            OpenStackError::Serialization(e) => NimbusError::Parse(e.to_string()),
            OpenStackError::UnexpectedResponse(msg) => NimbusError::Parse(msg),
            OpenStackError::Http(e) => {
                NimbusError::provider(e.status().map(|s| s.as_u16()).unwrap_or(0), e.to_string())
            }
        }
    }
}
