//! # Accreditation Common Library
//!
//! Shared code for the accreditation workspace including:
//! - Error type shared by every crate
//! - Configuration loading and root folder resolution
//! - Database initialization and schema introspection
//! - Text folding helpers (diacritics, whitespace)
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod text;
pub mod time;

pub use error::{Error, Result};
