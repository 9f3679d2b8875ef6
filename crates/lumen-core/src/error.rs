use thiserror::Error;

use crate::shape::Shape;

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch: {expected} vs {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    #[error("Vector does not belong to the required space: {0}")]
    IncorrectSpace(String),

    #[error("Index {index} out of bounds for extent {extent}")]
    OutOfBounds { index: isize, extent: usize },

    #[error("Unsupported element type: {0}")]
    InvalidType(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Integer overflow: {0}")]
    Overflow(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, LumenError>;
