//! The context a host uses to drive the interpreter.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use basher_core::env;
use basher_core::{
    CancellationToken, ContextConfig, EnvOverrides, ExecutionEngine, InputSource, OutputSink,
    RunOutcome, RunRequest, ScriptLoader, StdioConfig, StopReason, stage,
};
use basher_host::{DISPATCH_LOOKUP_STATUS, DispatchOutcome, FunctionRegistry};
use basher_observe::{EventDispatcher, RunEvent, RunId, RunReport, RunStatus, StopCause};
use tracing::{debug, error};

use crate::BasherError;

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Timeout for this run, replacing the context default.
    pub timeout: Option<Duration>,
    /// Token that stops the run when cancelled.
    pub cancel: Option<CancellationToken>,
    /// Standard streams for this run, replacing the context's.
    pub stdio: Option<StdioConfig>,
}

impl RunOptions {
    /// Options that change nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Use separate standard streams.
    pub fn with_stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = Some(stdio);
        self
    }
}

/// A configured interpreter with sourced scripts and exported functions.
///
/// The exported function registry is frozen when the context is built.
/// Scripts, environment overrides and standard streams can still be changed
/// between runs through `&mut self`.
pub struct Context {
    config: Arc<ContextConfig>,
    engine: ExecutionEngine,
    registry: Arc<FunctionRegistry>,
    loader: Arc<dyn ScriptLoader>,
    scripts: Vec<String>,
    env: EnvOverrides,
    stdio: StdioConfig,
    events: Arc<EventDispatcher>,
}

impl Context {
    pub(crate) fn new(
        config: ContextConfig,
        registry: Arc<FunctionRegistry>,
        loader: Arc<dyn ScriptLoader>,
        scripts: Vec<String>,
        env: EnvOverrides,
        events: Arc<EventDispatcher>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            engine: ExecutionEngine::new(Arc::clone(&config)),
            config,
            registry,
            loader,
            scripts,
            env,
            stdio: StdioConfig::inherit(),
            events,
        }
    }

    /// The context configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The exported functions.
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Sourced script names, in order.
    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    /// Exported variables.
    pub fn env(&self) -> &EnvOverrides {
        &self.env
    }

    /// The event dispatcher.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// The standard streams used by runs.
    pub fn stdio(&self) -> &StdioConfig {
        &self.stdio
    }

    /// Source a script in every later run.
    ///
    /// The script is resolved through the loader when a run starts, so a
    /// missing script fails that run rather than this call.
    pub fn source(&mut self, name: impl Into<String>) -> &mut Self {
        self.scripts.push(name.into());
        self
    }

    /// Export a variable into every later run.
    pub fn export(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, BasherError> {
        self.env.export(name, value)?;
        Ok(self)
    }

    /// Export every host environment variable with a valid name.
    ///
    /// Names bash keeps readonly are skipped. Returns how many variables
    /// were exported.
    pub fn copy_env(&mut self) -> usize {
        let mut copied = 0;
        for (name, value) in std::env::vars_os() {
            let (Some(name), Some(value)) = (name.to_str(), value.to_str()) else {
                continue;
            };
            if env::is_shell_readonly(name) {
                continue;
            }
            if self.env.export(name, value).is_ok() {
                copied += 1;
            }
        }
        debug!(copied, "Copied host environment");
        copied
    }

    /// Set standard input for later runs.
    pub fn set_stdin(&mut self, stdin: InputSource) -> &mut Self {
        self.stdio.stdin = stdin;
        self
    }

    /// Set standard output for later runs.
    pub fn set_stdout(&mut self, stdout: OutputSink) -> &mut Self {
        self.stdio.stdout = stdout;
        self
    }

    /// Set standard error for later runs.
    pub fn set_stderr(&mut self, stderr: OutputSink) -> &mut Self {
        self.stdio.stderr = stderr;
        self
    }

    /// Run `function` with `args` and return its exit status.
    pub fn run<I, S>(&self, function: &str, args: I) -> Result<i32, BasherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.run_outcome(function, args, RunOptions::new())?.status)
    }

    /// Run `function` with `args`, killing it after `timeout`.
    pub fn run_with_timeout<I, S>(
        &self,
        function: &str,
        args: I,
        timeout: Duration,
    ) -> Result<i32, BasherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = RunOptions::new().with_timeout(timeout);
        Ok(self.run_outcome(function, args, options)?.status)
    }

    /// Run `function` with `args` and return the full outcome.
    pub fn run_outcome<I, S>(
        &self,
        function: &str,
        args: I,
        options: RunOptions,
    ) -> Result<RunOutcome, BasherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execute(
            RunId::new(),
            function,
            args.into_iter().map(Into::into).collect(),
            options,
        )
    }

    /// Run `function` and summarise it as a report.
    ///
    /// Bridge failures are recorded in the report instead of returned.
    pub fn run_report<I, S>(&self, function: &str, args: I, options: RunOptions) -> RunReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let run_id = RunId::new();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        match self.execute(run_id, function, args.clone(), options) {
            Ok(outcome) => {
                let status = match outcome.stopped {
                    Some(reason) => RunStatus::Stopped {
                        cause: stop_cause(reason),
                        status: outcome.status,
                    },
                    None => RunStatus::Exited {
                        status: outcome.status,
                    },
                };
                let mut report = RunReport::new(run_id, function, status)
                    .with_args(args)
                    .with_scripts(self.scripts.clone())
                    .with_pid(outcome.pid)
                    .with_elapsed(outcome.elapsed);
                if let Some(path) = &outcome.script_path {
                    report = report.with_script_path(path.display().to_string());
                }
                if outcome.timed_out() {
                    report.add_warning(format!("killed after {:?}", outcome.elapsed));
                }
                report
            }
            Err(err) => {
                let mut report = RunReport::new(
                    run_id,
                    function,
                    RunStatus::Failed {
                        message: err.to_string(),
                    },
                )
                .with_args(args)
                .with_scripts(self.scripts.clone());
                report.add_error(err.to_string());
                report
            }
        }
    }

    fn execute(
        &self,
        run_id: RunId,
        function: &str,
        args: Vec<String>,
        options: RunOptions,
    ) -> Result<RunOutcome, BasherError> {
        let staged = stage(self.scripts.as_slice(), self.loader.as_ref()).map_err(|err| {
            self.emit_error(&err);
            err
        })?;
        self.events.emit(RunEvent::ScriptsStaged {
            run_id,
            scripts: staged.names().to_vec(),
            bytes: staged.source().len(),
        });

        let arg_count = args.len();
        let mut request = RunRequest::new(function)
            .with_args(args)
            .with_staged(staged)
            .with_env(self.env.clone())
            .with_prelude(self.registry.shell_shims(&self.config.self_path))
            .with_stdio(options.stdio.unwrap_or_else(|| self.stdio.clone()));
        if let Some(timeout) = options.timeout {
            request = request.with_timeout(timeout);
        }
        if let Some(token) = options.cancel {
            request = request.with_cancel(token);
        }

        self.events.emit(RunEvent::RunStarted {
            run_id,
            function: function.to_string(),
            args: arg_count,
        });

        let outcome = self.engine.run(request).map_err(|err| {
            self.emit_error(&err);
            err
        })?;

        let event = match outcome.stopped {
            Some(reason) => RunEvent::RunStopped {
                run_id,
                function: function.to_string(),
                cause: stop_cause(reason),
                duration: outcome.elapsed,
            },
            None => RunEvent::RunCompleted {
                run_id,
                function: function.to_string(),
                status: outcome.status,
                duration: outcome.elapsed,
            },
        };
        self.events.emit(event);

        Ok(outcome)
    }

    fn emit_error(&self, err: &dyn std::error::Error) {
        self.events.emit(RunEvent::Error {
            message: err.to_string(),
        });
    }

    /// Serve a callback if `argv` is a dispatch envelope.
    ///
    /// Call this first thing in `main`, before any other startup work.
    pub fn handle_dispatch<S: AsRef<str>>(
        &self,
        argv: &[S],
    ) -> Result<DispatchOutcome, BasherError> {
        let outcome = self.registry.handle_dispatch(argv)?;
        if let DispatchOutcome::Handled { function, status } = &outcome {
            self.events.emit(RunEvent::DispatchHandled {
                function: function.clone(),
                status: *status,
            });
        }
        Ok(outcome)
    }

    /// Serve a callback and exit the process if `argv` is a dispatch
    /// envelope. Returns normally otherwise.
    ///
    /// The process exits with the callback's status, or with
    /// [`DISPATCH_LOOKUP_STATUS`] when the function is not exported.
    pub fn exit_if_dispatch<S: AsRef<str>>(&self, argv: &[S]) {
        let status = match self.handle_dispatch(argv) {
            Ok(DispatchOutcome::NotDispatch) => return,
            Ok(DispatchOutcome::Handled { status, .. }) => status,
            Err(err) => {
                error!(error = %err, "Dispatch failed");
                eprintln!("basher: {}", err);
                DISPATCH_LOOKUP_STATUS
            }
        };
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        std::process::exit(status);
    }
}

fn stop_cause(reason: StopReason) -> StopCause {
    match reason {
        StopReason::Timeout => StopCause::Timeout,
        StopReason::Cancelled => StopCause::Cancelled,
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("scripts", &self.scripts)
            .field("env", &self.env.len())
            .finish()
    }
}
