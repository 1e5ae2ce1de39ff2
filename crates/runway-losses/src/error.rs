use thiserror::Error;

pub type LossResult<T> = std::result::Result<T, LossError>;

#[derive(Debug, Error)]
pub enum LossError {
    #[error("class {0} has no group mapping")]
    UnmappedClass(usize),

    #[error("invalid class group map: {0}")]
    InvalidGroupMap(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid loss input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
