use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Exchange rejected a request or is unavailable this cycle.
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Not enough history to compute an indicator.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Programming error: a caller passed a value the callee never accepts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No open trade with id {0}")]
    TradeNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors after which the caller should skip the current action and
    /// retry on the next scan.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Exchange(_) | Error::Http(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
