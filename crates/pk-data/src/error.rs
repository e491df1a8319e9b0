use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt dataset: {0}")]
    Corrupt(String),
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("shape error: {0}")]
    Shape(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

pub(crate) fn corrupt<S: Into<String>>(msg: S) -> DataError {
    DataError::Corrupt(msg.into())
}
pub(crate) fn integrity<S: Into<String>>(msg: S) -> DataError {
    DataError::Integrity(msg.into())
}
pub(crate) fn shape<S: Into<String>>(msg: S) -> DataError {
    DataError::Shape(msg.into())
}
