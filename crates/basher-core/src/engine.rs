//! Interpreter execution engine.
//!
//! The engine turns a [`RunRequest`] into one interpreter process:
//!
//! ```text
//! export lines          (EnvOverrides::render)
//! prelude               (callback shims)
//! staged scripts        (script::stage)
//! 'function' 'arg' ...  (trailer, every word quoted)
//! ```
//!
//! The body is written to a temp file that the interpreter runs as its
//! first argument. The engine then polls the child for completion between
//! checks of the run's cancellation token and deadline, and kills it when
//! either fires.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationToken, StopCondition, StopReason};
use crate::config::{ContextConfig, TerminationPolicy};
use crate::env::{self, EnvOverrides};
use crate::error::{ExecutionError, ExecutionResult};
use crate::script::StagedScript;
use crate::stdio::{InputSource, OutputSink, SharedWriter, StdioConfig};

/// Status reported for a run that was killed after exiting cleanly in the
/// same instant. Matches a shell's status for `SIGKILL`.
pub const KILLED_STATUS: i32 = 128 + 9;

/// Everything needed for one interpreter run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Shell function (or command) to call after sourcing.
    pub function: String,
    /// Arguments for the function.
    pub args: Vec<String>,
    /// Sourced scripts.
    pub staged: StagedScript,
    /// Exported variables.
    pub env: EnvOverrides,
    /// Shell source placed before the staged scripts.
    pub prelude: String,
    /// Standard streams.
    pub stdio: StdioConfig,
    /// Run timeout. Falls back to the configured default.
    pub timeout: Option<Duration>,
    /// Token that stops the run when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RunRequest {
    /// Create a request calling `function` with no arguments.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Self::default()
        }
    }

    /// Set the function arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the staged scripts.
    pub fn with_staged(mut self, staged: StagedScript) -> Self {
        self.staged = staged;
        self
    }

    /// Set the exported variables.
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    /// Set the prelude.
    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = prelude.into();
        self
    }

    /// Set the standard streams.
    pub fn with_stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = stdio;
        self
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

    /// Build the script body for this request.
    pub fn compose(&self) -> Vec<u8> {
        let mut body = Vec::new();

        body.extend_from_slice(self.env.render().as_bytes());
        if !self.prelude.is_empty() {
            body.extend_from_slice(self.prelude.as_bytes());
            if !self.prelude.ends_with('\n') {
                body.push(b'\n');
            }
        }
        body.extend_from_slice(self.staged.source());

        body.extend_from_slice(env::quote(&self.function).as_bytes());
        for arg in &self.args {
            body.push(b' ');
            body.extend_from_slice(env::quote(arg).as_bytes());
        }
        body.push(b'\n');

        body
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit status. `128 + n` when the interpreter died from signal `n`.
    pub status: i32,
    /// Set when the run was stopped by its deadline or token.
    pub stopped: Option<StopReason>,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
    /// Process ID of the interpreter.
    pub pid: u32,
    /// Staged script file, when retained in debug mode.
    pub script_path: Option<PathBuf>,
}

impl RunOutcome {
    /// Check if the interpreter exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Check if the run was killed because its deadline passed.
    pub fn timed_out(&self) -> bool {
        self.stopped == Some(StopReason::Timeout)
    }
}

/// Runs the interpreter for a context.
///
/// Runs take `&self` and may be issued from several threads at once. Each
/// gets its own process; output from runs sharing a sink interleaves.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    config: Arc<ContextConfig>,
}

impl ExecutionEngine {
    /// Create an engine for the given configuration.
    pub fn new(config: Arc<ContextConfig>) -> Self {
        Self { config }
    }

    /// The configuration used by this engine.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Run the interpreter and wait for it to exit or be stopped.
    pub fn run(&self, request: RunRequest) -> ExecutionResult<RunOutcome> {
        let script = self.write_script(&request.compose())?;
        let timeout = request.timeout.or(self.config.default_timeout);
        let stoppable = timeout.is_some() || request.cancel.is_some();

        let mut command = Command::new(&self.config.interpreter);
        command.arg(script.path());
        if !self.config.copy_env {
            command.env_clear();
        }
        // Group leadership is only needed when the run can be stopped, and
        // would detach the child from a controlling terminal otherwise.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if stoppable && self.config.termination == TerminationPolicy::ProcessGroup {
                command.process_group(0);
            }
        }

        let stdin_reader = request.stdio.stdin.take_reader();
        command
            .stdin(input_stdio(&request.stdio.stdin, stdin_reader.is_some()))
            .stdout(output_stdio(&request.stdio.stdout))
            .stderr(output_stdio(&request.stdio.stderr));

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            path: self.config.interpreter.clone(),
            source,
        })?;
        let pid = child.id();

        debug!(
            pid,
            function = %request.function,
            args = request.args.len(),
            scripts = request.staged.names().len(),
            timeout = ?timeout,
            "Spawned interpreter"
        );

        let pumps = match Pumps::start(&mut child, stdin_reader, &request.stdio) {
            Ok(pumps) => pumps,
            Err(err) => {
                self.terminate(&mut child, stoppable);
                let _ = child.wait();
                return Err(err);
            }
        };

        let stop = StopCondition::new(request.cancel.unwrap_or_default(), timeout);
        let (exit, stopped) = self.wait(&mut child, &stop, stoppable)?;
        let elapsed = started.elapsed();

        match stopped {
            None => pumps.join(),
            Some(reason) => {
                warn!(
                    pid,
                    function = %request.function,
                    reason = ?reason,
                    elapsed_ms = elapsed.as_millis(),
                    "Interpreter stopped"
                );
                pumps.detach();
            }
        }

        let mut status = exit_code(exit);
        if stopped.is_some() && status == 0 {
            status = KILLED_STATUS;
        }

        let script_path = script.retained_path();
        info!(
            pid,
            function = %request.function,
            status,
            duration_ms = elapsed.as_millis(),
            "Interpreter exited"
        );

        Ok(RunOutcome {
            status,
            stopped,
            elapsed,
            pid,
            script_path,
        })
    }

    fn write_script(&self, body: &[u8]) -> ExecutionResult<ScriptFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("basher-").suffix(".sh");
        let mut file = match &self.config.script_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(ExecutionError::ScriptWrite)?;

        file.write_all(body).map_err(ExecutionError::ScriptWrite)?;
        file.flush().map_err(ExecutionError::ScriptWrite)?;

        let temp_path = file.into_temp_path();
        if self.config.debug {
            let path = temp_path
                .keep()
                .map_err(|e| ExecutionError::ScriptWrite(e.error))?;
            info!(path = %path.display(), "Retained staged script");
            Ok(ScriptFile::Retained(path))
        } else {
            Ok(ScriptFile::Temporary(temp_path))
        }
    }

    fn wait(
        &self,
        child: &mut Child,
        stop: &StopCondition,
        stoppable: bool,
    ) -> ExecutionResult<(ExitStatus, Option<StopReason>)> {
        if !stoppable {
            let status = child.wait().map_err(ExecutionError::Interpreter)?;
            return Ok((status, None));
        }

        loop {
            if let Some(status) = child.try_wait().map_err(ExecutionError::Interpreter)? {
                return Ok((status, None));
            }
            if let Some(reason) = stop.check() {
                self.terminate(child, stoppable);
                let status = child.wait().map_err(ExecutionError::Interpreter)?;
                return Ok((status, Some(reason)));
            }
            stop.pause(self.config.poll_interval);
        }
    }

    /// Kill the interpreter with `SIGKILL`. The child has not been reaped
    /// yet, so its pid (and process group id) cannot have been reused.
    fn terminate(&self, child: &mut Child, grouped: bool) {
        #[cfg(unix)]
        {
            if grouped && self.config.termination == TerminationPolicy::ProcessGroup {
                let pgid = child.id() as libc::pid_t;
                // SAFETY: killpg only sends a signal; pgid is our unreaped child.
                let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
                if rc == 0 {
                    return;
                }
                warn!(
                    pgid,
                    error = %io::Error::last_os_error(),
                    "Failed to kill process group, killing interpreter only"
                );
            }
        }
        #[cfg(not(unix))]
        let _ = grouped;

        if let Err(e) = child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                warn!(pid = child.id(), error = %e, "Failed to kill interpreter");
            }
        }
    }
}

/// The staged script on disk.
enum ScriptFile {
    /// Deleted when dropped.
    Temporary(TempPath),
    /// Kept for inspection.
    Retained(PathBuf),
}

impl ScriptFile {
    fn path(&self) -> &Path {
        match self {
            ScriptFile::Temporary(path) => &**path,
            ScriptFile::Retained(path) => path.as_path(),
        }
    }

    fn retained_path(self) -> Option<PathBuf> {
        match self {
            ScriptFile::Temporary(_) => None,
            ScriptFile::Retained(path) => Some(path),
        }
    }
}

fn input_stdio(source: &InputSource, has_reader: bool) -> Stdio {
    match source {
        InputSource::Inherit => Stdio::inherit(),
        InputSource::Reader(_) if has_reader => Stdio::piped(),
        InputSource::Reader(_) | InputSource::Null => Stdio::null(),
    }
}

fn output_stdio(sink: &OutputSink) -> Stdio {
    match sink {
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::Null => Stdio::null(),
        OutputSink::Writer(_) => Stdio::piped(),
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Helper threads moving bytes between the child and the configured streams.
struct Pumps {
    outputs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pumps {
    fn start(
        child: &mut Child,
        stdin_reader: Option<Box<dyn Read + Send>>,
        stdio: &StdioConfig,
    ) -> ExecutionResult<Self> {
        let mut pumps = Pumps { outputs: Vec::new() };

        if let Some(mut reader) = stdin_reader {
            let mut stdin = child.stdin.take().ok_or_else(|| ExecutionError::StdioWiring {
                stream: "stdin",
                reason: "child stdin was not piped".to_string(),
            })?;
            // Not joined: a reader may block long after the child is gone.
            spawn_pump("stdin", move || {
                if let Err(e) = io::copy(&mut reader, &mut stdin) {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        debug!(error = %e, "stdin pump stopped");
                    }
                }
            })?;
        }

        if let OutputSink::Writer(writer) = &stdio.stdout {
            let stdout = child.stdout.take().ok_or_else(|| ExecutionError::StdioWiring {
                stream: "stdout",
                reason: "child stdout was not piped".to_string(),
            })?;
            let handle = spawn_pump("stdout", pump_output(stdout, Arc::clone(writer)))?;
            pumps.outputs.push(("stdout", handle));
        }

        if let OutputSink::Writer(writer) = &stdio.stderr {
            let stderr = child.stderr.take().ok_or_else(|| ExecutionError::StdioWiring {
                stream: "stderr",
                reason: "child stderr was not piped".to_string(),
            })?;
            let handle = spawn_pump("stderr", pump_output(stderr, Arc::clone(writer)))?;
            pumps.outputs.push(("stderr", handle));
        }

        Ok(pumps)
    }

    /// Wait until the child's output has been fully forwarded.
    fn join(self) {
        for (stream, handle) in self.outputs {
            if handle.join().is_err() {
                warn!(stream, "Output pump panicked");
            }
        }
    }

    /// Leave the pumps running. Descendants of a killed interpreter may
    /// still hold the pipes open.
    fn detach(self) {}
}

fn spawn_pump<F>(stream: &'static str, f: F) -> ExecutionResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("basher-{}", stream))
        .spawn(f)
        .map_err(|e| ExecutionError::StdioWiring {
            stream,
            reason: e.to_string(),
        })
}

fn pump_output<R: Read + Send + 'static>(
    mut from: R,
    to: SharedWriter,
) -> impl FnOnce() + Send + 'static {
    move || {
        let mut buf = [0u8; 8192];
        let mut sink_failed = false;
        loop {
            let n = match from.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "Output pump read failed");
                    break;
                }
            };
            // Keep draining after a sink failure so the child never blocks.
            if sink_failed {
                continue;
            }
            let mut writer = to.lock();
            if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                warn!(error = %e, "Output sink failed, discarding further output");
                sink_failed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{MapLoader, stage};
    use crate::stdio::CaptureBuffer;

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(ContextConfig::new("/bin/bash")))
    }

    fn staged(source: &str) -> StagedScript {
        let loader = MapLoader::new().with("test.sh", source);
        stage(&["test.sh"], &loader).unwrap()
    }

    fn captured() -> (CaptureBuffer, StdioConfig) {
        let buffer = CaptureBuffer::new();
        let stdio = StdioConfig::default()
            .with_stdin(InputSource::Null)
            .with_stdout(OutputSink::capture(&buffer));
        (buffer, stdio)
    }

    #[test]
    fn test_compose_layout() {
        let mut env = EnvOverrides::new();
        env.export("FOO", "bar").unwrap();

        let request = RunRequest::new("main")
            .with_args(["a b", "it's"])
            .with_env(env)
            .with_prelude("shim() { :; }")
            .with_staged(staged("main() { :; }"));

        let body = String::from_utf8(request.compose()).unwrap();
        assert_eq!(
            body,
            "export FOO='bar'\nshim() { :; }\nmain() { :; }\n'main' 'a b' 'it'\"'\"'s'\n"
        );
    }

    #[test]
    fn test_run_hello() {
        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged(r#"main() { echo "hello"; }"#))
            .with_stdio(stdio);

        let outcome = engine().run(request).unwrap();
        assert!(outcome.success());
        assert!(outcome.stopped.is_none());
        assert!(outcome.script_path.is_none());
        assert_eq!(stdout.to_string_lossy(), "hello\n");
    }

    #[test]
    fn test_run_stdin_echo() {
        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged("main() { cat; }"))
            .with_stdio(stdio.with_stdin(InputSource::bytes("hello\n")));

        let outcome = engine().run(request).unwrap();
        assert_eq!(outcome.status, 0);
        assert_eq!(stdout.to_string_lossy(), "hello\n");
    }

    #[test]
    fn test_run_args_are_single_words() {
        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_args(["two words", "$HOME", "`false`"])
            .with_staged(staged(r#"main() { printf '[%s]' "$@"; }"#))
            .with_stdio(stdio);

        engine().run(request).unwrap();
        assert_eq!(stdout.to_string_lossy(), "[two words][$HOME][`false`]");
    }

    #[test]
    fn test_run_exit_status() {
        let (_, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged("main() { return 3; }"))
            .with_stdio(stdio);

        assert_eq!(engine().run(request).unwrap().status, 3);
    }

    #[test]
    fn test_run_stderr_capture() {
        let stderr = CaptureBuffer::new();
        let stdio = StdioConfig::default()
            .with_stdin(InputSource::Null)
            .with_stdout(OutputSink::Null)
            .with_stderr(OutputSink::capture(&stderr));
        let request = RunRequest::new("main")
            .with_staged(staged("main() { echo out; echo err >&2; }"))
            .with_stdio(stdio);

        engine().run(request).unwrap();
        assert_eq!(stderr.to_string_lossy(), "err\n");
    }

    #[test]
    fn test_run_env_override() {
        let value = "Andy's Laptop says, \"$X=1\"";
        let mut env = EnvOverrides::new();
        env.export("FOOBAR", value).unwrap();

        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_env(env)
            .with_staged(staged(r#"main() { echo "$FOOBAR"; }"#))
            .with_stdio(stdio);

        engine().run(request).unwrap();
        assert_eq!(stdout.to_string_lossy().trim_end_matches('\n'), value);
    }

    #[test]
    fn test_run_without_copy_env() {
        // SAFETY: test-only variable that no other test reads.
        unsafe { std::env::set_var("BASHER_ENGINE_TEST_INHERITED", "yes") };
        let config = ContextConfig::new("/bin/bash").with_copy_env(false);
        let engine = ExecutionEngine::new(Arc::new(config));

        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged(r#"main() { echo "[${BASHER_ENGINE_TEST_INHERITED:-}]"; }"#))
            .with_stdio(stdio);

        engine.run(request).unwrap();
        assert_eq!(stdout.to_string_lossy(), "[]\n");
    }

    #[test]
    fn test_run_timeout_kills() {
        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged(r#"main() { sleep 1; echo "error"; }"#))
            .with_stdio(stdio)
            .with_timeout(Duration::from_millis(100));

        let outcome = engine().run(request).unwrap();
        assert!(outcome.timed_out());
        assert_ne!(outcome.status, 0);
        assert!(outcome.elapsed < Duration::from_secs(1));
        assert_eq!(stdout.to_string_lossy(), "");
    }

    #[test]
    fn test_run_timeout_keeps_partial_output_and_kills_group() {
        let (stdout, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged(
                "main() { echo partial; (sleep 0.3; echo late) & sleep 5; }",
            ))
            .with_stdio(stdio)
            .with_timeout(Duration::from_millis(150));

        let outcome = engine().run(request).unwrap();
        assert!(outcome.timed_out());
        assert_eq!(outcome.status, KILLED_STATUS);
        assert_eq!(stdout.to_string_lossy(), "partial\n");

        // The background job would have printed by now had it survived.
        thread::sleep(Duration::from_millis(500));
        assert_eq!(stdout.to_string_lossy(), "partial\n");
    }

    #[test]
    fn test_run_timeout_process_only() {
        let config =
            ContextConfig::new("/bin/bash").with_termination(TerminationPolicy::Process);
        let engine = ExecutionEngine::new(Arc::new(config));

        let request = RunRequest::new("main")
            .with_staged(staged("main() { sleep 1; }"))
            .with_stdio(StdioConfig::default().with_stdin(InputSource::Null))
            .with_timeout(Duration::from_millis(50));

        let outcome = engine.run(request).unwrap();
        assert!(outcome.timed_out());
        assert_eq!(outcome.status, KILLED_STATUS);
    }

    #[test]
    fn test_run_cancel_from_other_thread() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let (_, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged("main() { sleep 5; }"))
            .with_stdio(stdio)
            .with_cancel(token);

        let outcome = engine().run(request).unwrap();
        assert_eq!(outcome.stopped, Some(StopReason::Cancelled));
        assert!(!outcome.timed_out());
        assert_ne!(outcome.status, 0);
        handle.join().unwrap();
    }

    #[test]
    fn test_run_default_timeout() {
        let config =
            ContextConfig::new("/bin/bash").with_default_timeout(Duration::from_millis(50));
        let engine = ExecutionEngine::new(Arc::new(config));

        let (_, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged("main() { sleep 2; }"))
            .with_stdio(stdio);

        assert!(engine.run(request).unwrap().timed_out());
    }

    #[test]
    fn test_spawn_error() {
        let engine = ExecutionEngine::new(Arc::new(ContextConfig::new("/no/such/bash")));
        let err = engine.run(RunRequest::new("main")).unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[test]
    fn test_debug_retains_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::new("/bin/bash")
            .with_debug(true)
            .with_script_dir(dir.path());
        let engine = ExecutionEngine::new(Arc::new(config));

        let (_, stdio) = captured();
        let request = RunRequest::new("main")
            .with_staged(staged("main() { :; }"))
            .with_stdio(stdio);

        let outcome = engine.run(request).unwrap();
        let path = outcome.script_path.unwrap();
        assert!(path.starts_with(dir.path()));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.ends_with("'main'\n"));
    }

    #[test]
    fn test_non_debug_removes_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::new("/bin/bash").with_script_dir(dir.path());
        let engine = ExecutionEngine::new(Arc::new(config));

        let (_, stdio) = captured();
        engine
            .run(RunRequest::new("true").with_stdio(stdio))
            .unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_runs() {
        let engine = engine();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let (stdout, stdio) = captured();
                    let request = RunRequest::new("echo")
                        .with_args([i.to_string()])
                        .with_stdio(stdio);
                    engine.run(request).unwrap();
                    stdout.to_string_lossy()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("{}\n", i));
        }
    }
}
