//! Error types for Nimbus
//!
//! `NimbusError` is the taxonomy every crate converts into at its public
//! boundary. Not-found is a recoverable state on read paths, see
//! [`OptionalExt`].

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum NimbusError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid role '{0}'")]
    InvalidRole(String),

    #[error("quota label '{label}' is already used by '{existing}'")]
    DuplicateQuotaLabel { label: String, existing: String },

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NimbusError {
    pub fn not_found(what: impl Into<String>) -> Self {
        NimbusError::NotFound(what.into())
    }

    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        NimbusError::Provider {
            status,
            message: message.into(),
        }
    }

    /// Whether this error only means "does not exist yet"
    pub fn is_not_found(&self) -> bool {
        matches!(self, NimbusError::NotFound(_) | NimbusError::Provider { status: 404, .. })
    }
}

impl From<serde_json::Error> for NimbusError {
    fn from(value: serde_json::Error) -> Self {
        NimbusError::Parse(value.to_string())
    }
}

impl From<anyhow::Error> for NimbusError {
    fn from(value: anyhow::Error) -> Self {
        NimbusError::Internal(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NimbusError>;

/// Converts a not-found error into `Ok(None)`, passing every other error through.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
