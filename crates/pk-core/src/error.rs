use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("dtype error: {0}")]
    DType(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, PointError>;

pub fn invalid<S: Into<String>>(msg: S) -> PointError {
    PointError::InvalidArgument(msg.into())
}
pub fn dtype<S: Into<String>>(msg: S) -> PointError {
    PointError::DType(msg.into())
}
pub fn device<S: Into<String>>(msg: S) -> PointError {
    PointError::Device(msg.into())
}
pub fn exhausted<S: Into<String>>(msg: S) -> PointError {
    PointError::ResourceExhausted(msg.into())
}
