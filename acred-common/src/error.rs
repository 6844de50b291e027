//! Errors raised by the shared configuration and database layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Store open, pragma or introspection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file or root folder I/O
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable acred.toml, unsupported DATABASE_URL and similar
    #[error("Configuration error: {0}")]
    Config(String),
}
