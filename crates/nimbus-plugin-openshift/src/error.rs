// Error types for the OpenShift backend

use nimbus_common::NimbusError;

#[derive(Debug, thiserror::Error)]
pub enum OpenShiftError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<OpenShiftError> for NimbusError {
    fn from(value: OpenShiftError) -> Self {
        match value {
            OpenShiftError::Kube(kube::Error::Api(ae)) => NimbusError::provider(ae.code, ae.message),
            OpenShiftError::Kube(e) => NimbusError::provider(0, e.to_string()),
            OpenShiftError::NotFound(what) => NimbusError::NotFound(what),
            OpenShiftError::AlreadyExists(what) => {
                NimbusError::provider(409, format!("{} already exists", what))
            }
            OpenShiftError::Serialization(e) => NimbusError::Parse(e.to_string()),
            OpenShiftError::InvalidObject(msg) => NimbusError::Parse(msg),
            OpenShiftError::Config(msg) => NimbusError::Config(msg),
        }
    }
}
