//! Core error types for basher.
//!
//! Bridge-level failures are always reported through these types and never
//! folded into an exit status. A script that exits non-zero, or a run that is
//! killed on timeout, is a normal [`RunOutcome`](crate::engine::RunOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for basher core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid context configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A script could not be staged.
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// The interpreter could not be started or driven.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Errors in the context configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The interpreter path does not exist.
    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(PathBuf),

    /// The interpreter path exists but is not an executable file.
    #[error("Interpreter is not an executable file: {0}")]
    InterpreterNotExecutable(PathBuf),

    /// An environment variable name is not a valid shell identifier.
    #[error("Invalid environment variable name: '{0}'")]
    InvalidVariableName(String),

    /// The path of the running executable could not be determined.
    #[error("Cannot determine the current executable path: {0}")]
    SelfPathUnavailable(#[source] std::io::Error),
}

/// Errors while resolving scripts through a loader.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The loader failed for the named script.
    #[error("Failed to load script '{name}': {source}")]
    LoadFailed {
        /// The logical script name.
        name: String,
        /// The loader's error.
        #[source]
        source: LoadError,
    },
}

/// Error type returned by script loaders.
pub type LoadError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors while running the interpreter.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The interpreter process could not be started.
    #[error("Failed to spawn interpreter '{path}': {source}")]
    Spawn {
        /// The interpreter path.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A standard stream of the child could not be connected.
    #[error("Failed to wire {stream} for the interpreter: {reason}")]
    StdioWiring {
        /// Which stream failed (`stdin`, `stdout` or `stderr`).
        stream: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The running interpreter could not be waited on or signalled.
    #[error("Lost contact with the interpreter: {0}")]
    Interpreter(#[source] std::io::Error),

    /// The staged script file could not be written.
    #[error("Failed to write staged script: {0}")]
    ScriptWrite(#[source] std::io::Error),
}

/// Result type alias for basher core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for script staging.
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failed_names_script() {
        let err = ScriptError::LoadFailed {
            name: "lib.sh".to_string(),
            source: "no such script".into(),
        };
        let message = err.to_string();
        assert!(message.contains("lib.sh"));
        assert!(message.contains("no such script"));
    }

    #[test]
    fn test_core_error_from_variants() {
        let err: CoreError = ConfigError::InvalidVariableName("1BAD".to_string()).into();
        assert!(matches!(err, CoreError::Config(_)));

        let err: CoreError = ExecutionError::StdioWiring {
            stream: "stdout",
            reason: "not piped".to_string(),
        }
        .into();
        assert!(err.to_string().contains("stdout"));
    }
}
