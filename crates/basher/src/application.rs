//! Common entry point for bash applications with exported functions.

use std::path::PathBuf;

use tracing::debug;

use crate::{BasherError, ContextBuilder};

/// Environment variable that turns on debug mode when non-empty.
pub const DEBUG_ENV: &str = "BASHER_DEBUG";

/// The interpreter to use when none is configured.
///
/// `$SHELL` if it names a bash binary, `/bin/bash` otherwise.
pub fn default_interpreter() -> PathBuf {
    match std::env::var("SHELL") {
        Ok(shell) if shell.contains("bash") => PathBuf::from(shell),
        _ => PathBuf::from("/bin/bash"),
    }
}

/// A program whose `main` is a shell function.
///
/// Running the application serves callbacks first: when the process was
/// started by one of its own exported functions, the function runs and its
/// status is returned without sourcing anything. Otherwise the entry
/// function is called with the program's arguments.
#[derive(Debug)]
pub struct Application {
    builder: ContextBuilder,
    entry: String,
    copy_env: bool,
}

impl Application {
    /// Wrap a configured context builder.
    pub fn new(builder: ContextBuilder) -> Self {
        Self {
            builder,
            entry: "main".to_string(),
            copy_env: true,
        }
    }

    /// Set the shell function called on startup. Defaults to `main`.
    pub fn with_entry(mut self, function: impl Into<String>) -> Self {
        self.entry = function.into();
        self
    }

    /// Choose whether the interpreter inherits the host environment.
    pub fn with_copy_env(mut self, enabled: bool) -> Self {
        self.copy_env = enabled;
        self
    }

    /// Run with the process arguments.
    pub fn run(self) -> Result<i32, BasherError> {
        let argv: Vec<String> = std::env::args().collect();
        self.run_with_args(&argv)
    }

    /// Run with an explicit argument vector, `argv[0]` included.
    pub fn run_with_args<S: AsRef<str>>(self, argv: &[S]) -> Result<i32, BasherError> {
        let debug = std::env::var_os(DEBUG_ENV).is_some_and(|value| !value.is_empty());
        let mut builder = self.builder.with_copy_env(self.copy_env);
        if debug {
            builder = builder.with_debug(true);
        }
        let context = builder.build()?;

        if let Some(status) = context.handle_dispatch(argv)?.status() {
            return Ok(status);
        }

        let args: Vec<String> = argv
            .iter()
            .skip(1)
            .map(|a| a.as_ref().to_string())
            .collect();
        debug!(entry = %self.entry, args = args.len(), "Starting application");
        context.run(&self.entry, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn app() -> Application {
        let builder = Basher::builder("/bin/bash")
            .with_loader(MapLoader::new().with("app.sh", "main() { return \"$#\"; }"))
            .source("app.sh")
            .export_func_with_status("callback", |args: &[String]| args.len() as i32 + 10)
            .unwrap();
        Application::new(builder)
    }

    #[test]
    fn test_runs_main_with_args() {
        let status = app().run_with_args(&["prog", "a", "b", "c"]).unwrap();
        assert_eq!(status, 3);
    }

    #[test]
    fn test_custom_entry() {
        let builder = Basher::builder("/bin/bash")
            .with_loader(MapLoader::new().with("app.sh", "start() { return 4; }"))
            .source("app.sh");
        let status = Application::new(builder)
            .with_entry("start")
            .run_with_args(&["prog"])
            .unwrap();
        assert_eq!(status, 4);
    }

    #[test]
    fn test_serves_dispatch_first() {
        let status = app()
            .run_with_args(&["prog", ":::", "callback", "x", "y"])
            .unwrap();
        assert_eq!(status, 12);
    }

    #[test]
    fn test_unknown_dispatch_is_error() {
        let result = app().run_with_args(&["prog", ":::", "nope"]);
        assert!(matches!(result, Err(BasherError::Host(_))));
    }

    #[test]
    fn test_default_interpreter_is_bash() {
        let path = default_interpreter();
        assert!(path.to_string_lossy().contains("bash"));
    }
}
