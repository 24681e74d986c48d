use registrar_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Consul returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid Consul URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<RegistryError> for CoreError {
    fn from(e: RegistryError) -> Self {
        CoreError::Registry(e.to_string())
    }
}
