//! Error handling for the settingsctl crate.

use std::{io, result};

use thiserror::Error;

/// Convenient result type for settingsctl operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Errors surfaced by a settings store.
    #[error("{0}")]
    Settings(#[from] settings_engine::Error),
    /// No default data directory could be determined.
    #[error("cannot locate a configuration directory; pass --data-dir")]
    NoDataDir,
    /// No schema definitions were found.
    #[error("no schema definitions found in {0}")]
    NoSchemas(String),
}
