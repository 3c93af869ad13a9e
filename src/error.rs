use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendError {
    #[error("Source name '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No source named '{0}'")]
    UnknownSource(String),

    #[error("Session configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrendError>;
