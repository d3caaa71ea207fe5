//! Top-level error type.

use std::path::PathBuf;

use pof_core::ResourceError;
use pof_script::ScriptError;
use thiserror::Error;

/// Errors surfaced by the runtime.
#[derive(Error, Debug)]
pub enum PofError {
    /// Configuration text is not valid TOML for [`PofConfig`](crate::PofConfig).
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// A file could not be read.
    #[error("can't read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Interpreter failure.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Registry contract violation.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Result type for runtime operations.
pub type PofResult<T> = Result<T, PofError>;
