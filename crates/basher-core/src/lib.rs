//! Basher Core - Shell Function Execution
//!
//! This crate runs shell functions in a fresh interpreter process. It
//! includes:
//!
//! - [`ContextConfig`]: Interpreter path and run behavior
//! - [`ExecutionEngine`]: Spawns the interpreter and waits for it
//! - [`ScriptLoader`] and [`stage`]: Resolving and concatenating scripts
//! - [`EnvOverrides`]: Variables exported into every run
//! - [`StdioConfig`]: Standard stream wiring
//! - [`CancellationToken`]: Stopping a run early
//!
//! # Quick Start
//!
//! ```ignore
//! use basher_core::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = ExecutionEngine::new(Arc::new(ContextConfig::new("/bin/bash")));
//!
//! let loader = MapLoader::new().with("hello.sh", "hello() { echo hello; }");
//! let staged = stage(&["hello.sh"], &loader)?;
//!
//! let outcome = engine.run(RunRequest::new("hello").with_staged(staged))?;
//! assert!(outcome.success());
//! ```
//!
//! # Run Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  export NAME='value'   (overrides)      │
//! ├─────────────────────────────────────────┤
//! │  prelude               (callback shims) │
//! ├─────────────────────────────────────────┤
//! │  staged scripts        (in order)       │
//! ├─────────────────────────────────────────┤
//! │  'function' 'arg' ...                   │
//! └─────────────────────────────────────────┘
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod script;
pub mod stdio;

// Re-export main types at crate root
pub use cancel::{CancellationToken, Deadline, StopReason};
pub use config::{ContextConfig, TerminationPolicy};
pub use engine::{ExecutionEngine, KILLED_STATUS, RunOutcome, RunRequest};
pub use env::EnvOverrides;
pub use error::{
    ConfigError, ConfigResult, CoreError, ExecutionError, ExecutionResult, LoadError, Result,
    ScriptError, ScriptResult,
};
pub use script::{DirLoader, MapLoader, ScriptLoader, StagedScript, stage};
pub use stdio::{CaptureBuffer, InputSource, OutputSink, StdioConfig};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use basher_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cancel::{CancellationToken, StopReason};
    pub use crate::config::{ContextConfig, TerminationPolicy};
    pub use crate::engine::{ExecutionEngine, RunOutcome, RunRequest};
    pub use crate::env::EnvOverrides;
    pub use crate::error::{CoreError, ExecutionError, Result, ScriptError};
    pub use crate::script::{MapLoader, ScriptLoader, stage};
    pub use crate::stdio::{CaptureBuffer, InputSource, OutputSink, StdioConfig};
}
