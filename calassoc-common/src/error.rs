//! Shared error type
//!
//! Raised by the persistence layer, configuration loading and the enum
//! parsers. Rule evaluation wraps it in `EvalError::Store`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Archive, cache or queue statement failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file read or database directory creation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Instrument block or type tag column is not valid JSON for its shape
    #[error("Column encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad TOML, unknown module or category names, out-of-range worker settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Observation id with no record behind it
    #[error("Not found: {0}")]
    NotFound(String),

    /// Text that does not parse as an enumeration value, category or timestamp
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
