use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid worker task: {0}")]
    InvalidTask(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
