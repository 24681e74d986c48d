use registrar_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Unsupported Docker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Container response without id")]
    MissingId,
}

impl From<RuntimeError> for CoreError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            }) => CoreError::ContainerNotFound(message),
            other => CoreError::Runtime(other.to_string()),
        }
    }
}
