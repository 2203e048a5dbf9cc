//! Configuration types for basher contexts.
//!
//! [`ContextConfig`] holds everything the execution engine needs to know
//! about the interpreter and how runs behave. It is built once and shared
//! immutably by every run of a context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// How a timed-out run is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationPolicy {
    /// Spawn the interpreter as a process group leader and kill the whole
    /// group, so commands started by the script die with it.
    #[default]
    ProcessGroup,
    /// Kill only the interpreter process. Descendants may outlive the run
    /// and keep its output streams open.
    Process,
}

/// Configuration for a basher context.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Path to the interpreter executable.
    pub interpreter: PathBuf,

    /// Retain staged scripts on disk and log their paths.
    pub debug: bool,

    /// Path the interpreter runs to call back into the host.
    ///
    /// Defaults to the current executable.
    pub self_path: PathBuf,

    /// Start the interpreter with the host's environment.
    ///
    /// When disabled the child starts from an empty environment and only
    /// sees explicitly exported variables.
    pub copy_env: bool,

    /// How runs are terminated when their deadline passes.
    pub termination: TerminationPolicy,

    /// Timeout applied to runs that don't supply their own.
    pub default_timeout: Option<Duration>,

    /// How often a running interpreter is checked for completion or
    /// cancellation.
    ///
    /// Defaults to 10ms.
    pub poll_interval: Duration,

    /// Directory for staged script files. Defaults to the system temp dir.
    pub script_dir: Option<PathBuf>,
}

impl ContextConfig {
    /// Create a configuration for the given interpreter.
    ///
    /// The self path defaults to the current executable. If it cannot be
    /// determined, an empty path is used; set one with
    /// [`with_self_path`](Self::with_self_path) before exporting functions.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            debug: false,
            self_path: std::env::current_exe().unwrap_or_default(),
            copy_env: true,
            termination: TerminationPolicy::default(),
            default_timeout: None,
            poll_interval: Duration::from_millis(10),
            script_dir: None,
        }
    }

    /// Enable or disable debug mode.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Override the path used for callbacks into the host.
    pub fn with_self_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.self_path = path.into();
        self
    }

    /// Enable or disable inheriting the host environment.
    pub fn with_copy_env(mut self, enabled: bool) -> Self {
        self.copy_env = enabled;
        self
    }

    /// Set the termination policy.
    pub fn with_termination(mut self, policy: TerminationPolicy) -> Self {
        self.termination = policy;
        self
    }

    /// Set the default run timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the completion poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the directory staged scripts are written to.
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    /// Check that the interpreter is an executable file.
    pub fn validate(&self) -> ConfigResult<()> {
        check_executable(&self.interpreter)
    }
}

fn check_executable(path: &Path) -> ConfigResult<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| ConfigError::InterpreterNotFound(path.to_path_buf()))?;

    if !metadata.is_file() {
        return Err(ConfigError::InterpreterNotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ConfigError::InterpreterNotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ContextConfig::new("/bin/bash");
        assert!(!config.debug);
        assert!(config.copy_env);
        assert_eq!(config.termination, TerminationPolicy::ProcessGroup);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert!(config.default_timeout.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ContextConfig::new("/bin/bash")
            .with_debug(true)
            .with_self_path("/bin/echo")
            .with_copy_env(false)
            .with_termination(TerminationPolicy::Process)
            .with_default_timeout(Duration::from_secs(5));

        assert!(config.debug);
        assert_eq!(config.self_path, PathBuf::from("/bin/echo"));
        assert!(!config.copy_env);
        assert_eq!(config.termination, TerminationPolicy::Process);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_validate_missing_interpreter() {
        let config = ContextConfig::new("/definitely/not/a/shell");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InterpreterNotFound(_))
        ));
    }

    #[test]
    fn test_validate_directory_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::new(dir.path());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InterpreterNotExecutable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_non_executable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ContextConfig::new(file.path());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InterpreterNotExecutable(_))
        ));
    }

    #[test]
    fn test_validate_bash() {
        assert!(ContextConfig::new("/bin/bash").validate().is_ok());
    }
}
