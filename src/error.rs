use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Source acquisition error: {0}")]
    Acquire(String),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
