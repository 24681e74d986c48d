use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Service registry error: {0}")]
    Registry(String),

    #[error("Event stream error: {0}")]
    EventStream(String),
}
