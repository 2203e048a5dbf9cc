//! # Basher - Drive Bash From Rust
//!
//! Basher runs shell functions in a bash subprocess and lets those scripts
//! call Rust functions back as if they were ordinary commands.
//!
//! ## Features
//!
//! - **Sourcing**: Scripts are resolved by name through a pluggable loader
//! - **Callbacks**: Exported Rust functions become shell commands
//! - **Control**: Standard streams, environment and timeouts per run
//! - **Observability**: Run events and serializable reports
//!
//! ## Quick Start
//!
//! ```ignore
//! use basher::prelude::*;
//!
//! let context = Basher::builder("/bin/bash")
//!     .with_loader(MapLoader::new().with("app.sh", "main() { notify \"$@\"; }"))
//!     .source("app.sh")
//!     .export_func("notify", |args: &[String]| println!("notified: {:?}", args))?
//!     .build()?;
//!
//! // A callback re-runs this binary; serve it before anything else.
//! let argv: Vec<String> = std::env::args().collect();
//! context.exit_if_dispatch(&argv);
//!
//! let status = context.run("main", &argv[1..])?;
//! std::process::exit(status);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                     basher (facade)                     │
//! │                  ┌──────────────────┐                   │
//! │                  │  ContextBuilder  │                   │
//! │                  └────────┬─────────┘                   │
//! │                           │                             │
//! │  ┌──────────────┬─────────┴────────┬────────────────┐   │
//! │  │ basher-core  │ basher-host      │ basher-observe │   │
//! │  │ (engine,     │ (exports,        │ (events,       │   │
//! │  │  scripts)    │  dispatch)       │  reports)      │   │
//! │  └──────────────┴──────────────────┴────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                      bash process                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod application;
mod context;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use basher_core::{
    ConfigError, ContextConfig, DirLoader, EnvOverrides, ExecutionError, ScriptError,
    ScriptLoader, StdioConfig, TerminationPolicy,
};
use basher_host::{FunctionRegistryBuilder, HostError};
use basher_observe::{EventDispatcher, EventSubscriber};
use tracing::info;

pub use application::{Application, DEBUG_ENV, default_interpreter};
pub use context::{Context, RunOptions};

// Re-export from sub-crates
pub use basher_core;
pub use basher_host;
pub use basher_observe;

/// Main entry point for basher.
pub struct Basher;

impl Basher {
    /// Create a context builder for the given interpreter.
    pub fn builder(interpreter: impl Into<PathBuf>) -> ContextBuilder {
        ContextBuilder::new(interpreter)
    }
}

/// Builder for configuring a [`Context`].
pub struct ContextBuilder {
    config: ContextConfig,
    functions: FunctionRegistryBuilder,
    loader: Option<Arc<dyn ScriptLoader>>,
    scripts: Vec<String>,
    env: EnvOverrides,
    stdio: StdioConfig,
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl ContextBuilder {
    /// Create a builder for the given interpreter.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            config: ContextConfig::new(interpreter),
            functions: FunctionRegistryBuilder::new(),
            loader: None,
            scripts: Vec::new(),
            env: EnvOverrides::new(),
            stdio: StdioConfig::inherit(),
            event_subscribers: Vec::new(),
        }
    }

    // Interpreter configuration

    /// Enable or disable debug mode.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Override the path scripts run to call back into the host.
    pub fn with_self_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.self_path = path.into();
        self
    }

    /// Enable or disable inheriting the host environment.
    pub fn with_copy_env(mut self, enabled: bool) -> Self {
        self.config.copy_env = enabled;
        self
    }

    /// Set how timed-out runs are terminated.
    pub fn with_termination(mut self, policy: TerminationPolicy) -> Self {
        self.config.termination = policy;
        self
    }

    /// Set the default run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Set the completion poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the directory staged scripts are written to.
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.script_dir = Some(dir.into());
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    // Scripts and environment

    /// Set the script loader. Defaults to reading names as file paths.
    pub fn with_loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Source a script in every run.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.scripts.push(name.into());
        self
    }

    /// Export a variable into every run.
    pub fn export(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, BasherError> {
        self.env.export(name, value)?;
        Ok(self)
    }

    /// Set the standard streams.
    pub fn with_stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = stdio;
        self
    }

    // Exported functions

    /// Export a function that exits with status 0.
    pub fn export_func<F>(mut self, name: impl Into<String>, func: F) -> Result<Self, BasherError>
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.functions.export_func(name, func)?;
        Ok(self)
    }

    /// Export a function whose return value becomes its exit status.
    pub fn export_func_with_status<F>(
        mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<Self, BasherError>
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        self.functions.export_func_with_status(name, func)?;
        Ok(self)
    }

    /// Access the function registry being built.
    pub fn functions_mut(&mut self) -> &mut FunctionRegistryBuilder {
        &mut self.functions
    }

    // Observability

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Build the context.
    pub fn build(mut self) -> Result<Context, BasherError> {
        self.config.validate()?;

        if !self.functions.is_empty() && self.config.self_path.as_os_str().is_empty() {
            self.config.self_path =
                std::env::current_exe().map_err(ConfigError::SelfPathUnavailable)?;
        }

        let registry = self.functions.build();
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(DirLoader::new("")) as Arc<dyn ScriptLoader>);

        let events = EventDispatcher::new();
        for subscriber in self.event_subscribers {
            events.subscribe(subscriber);
        }

        info!(
            interpreter = %self.config.interpreter.display(),
            debug = self.config.debug,
            scripts = self.scripts.len(),
            exports = registry.len(),
            "Built context"
        );

        let mut context = Context::new(
            self.config,
            registry,
            loader,
            self.scripts,
            self.env,
            Arc::new(events),
        );
        let stdio = self.stdio;
        context
            .set_stdin(stdio.stdin)
            .set_stdout(stdio.stdout)
            .set_stderr(stdio.stderr);
        Ok(context)
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("config", &self.config)
            .field("functions", &self.functions)
            .field("scripts", &self.scripts)
            .finish()
    }
}

/// Errors from basher.
#[derive(Debug, thiserror::Error)]
pub enum BasherError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Script error.
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Execution error.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Exported function or dispatch error.
    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

impl From<basher_core::CoreError> for BasherError {
    fn from(err: basher_core::CoreError) -> Self {
        match err {
            basher_core::CoreError::Config(e) => BasherError::Config(e),
            basher_core::CoreError::Script(e) => BasherError::Script(e),
            basher_core::CoreError::Execution(e) => BasherError::Execution(e),
        }
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{Application, Basher, BasherError, Context, ContextBuilder, RunOptions};

    // Core types
    pub use basher_core::{
        CancellationToken, CaptureBuffer, ContextConfig, DirLoader, InputSource, MapLoader,
        OutputSink, RunOutcome, ScriptLoader, StdioConfig, StopReason, TerminationPolicy,
    };

    // Host types
    pub use basher_host::{DispatchOutcome, FunctionRegistry, SENTINEL};

    // Observability types
    pub use basher_observe::{
        CollectingSubscriber, EventSubscriber, LoggingSubscriber, RunEvent, RunReport, RunStatus,
    };

    // Common std types
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
