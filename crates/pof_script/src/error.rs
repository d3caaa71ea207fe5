//! # Script Error Types
//!
//! Every script-originated failure is recovered where it happens: logged,
//! the operation skipped, the render loop carries on. These types exist so
//! callers and tests can tell the cases apart.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the interpreter bridge.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The script text failed to evaluate. The node stays unloaded and
    /// retries on its next draw.
    #[error("{node}: {message}")]
    Load {
        /// Namespace name.
        node: String,
        /// Interpreter message.
        message: String,
    },

    /// A hook or dispatched function raised at runtime. The node stays
    /// loaded.
    #[error("{node}: error running {function}(): {message}")]
    Call {
        /// Namespace name.
        node: String,
        /// Function that failed.
        function: String,
        /// Interpreter message.
        message: String,
    },

    /// The script file could not be found through the search path.
    #[error("can't open {file}")]
    NotFound {
        /// File as written by the user.
        file: String,
    },

    /// The script file could not be read.
    #[error("can't read {path}: {source}")]
    Io {
        /// Resolved path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Interpreter setup or namespace manipulation failed.
    #[error("interpreter: {0}")]
    Interpreter(String),
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        Self::Interpreter(err.to_string())
    }
}

/// Result type for bridge operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
