use contend_core::FailureKind;
use thiserror::Error;

// Primary SQLite result codes; extended codes carry these in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_NOTADB: i32 = 26;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("SQLx error: {0}")]
    Sqlx(#[source] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a driver error onto the store's failure taxonomy.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let message = db.message().to_string();
            return match primary_code(db.code().as_deref()) {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => Error::Busy(message),
                Some(SQLITE_CONSTRAINT) => Error::Constraint(message),
                Some(SQLITE_CANTOPEN) | Some(SQLITE_NOTADB) => Error::Unavailable(message),
                _ => Error::Query(message),
            };
        }
        Error::Sqlx(err)
    }

    /// Like [`Error::classify`], but anything other than contention while
    /// opening means the resource could not be opened at all.
    pub fn opening(err: sqlx::Error) -> Self {
        match Error::classify(err) {
            Error::Busy(message) => Error::Busy(message),
            other => Error::Unavailable(other.to_string()),
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Busy(_) => FailureKind::ResourceBusy,
            Error::Constraint(_) => FailureKind::ConstraintViolation,
            _ => FailureKind::StoreUnavailable,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}

fn primary_code(code: Option<&str>) -> Option<i32> {
    code.and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff)
}
