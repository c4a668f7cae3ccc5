use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] contend_db::Error),

    #[error(transparent)]
    Core(#[from] contend_core::Error),

    #[error("Reporter failed: {0}")]
    Reporter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
