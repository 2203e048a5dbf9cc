//! Run reports.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a run was stopped before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// The run's deadline passed.
    Timeout,
    /// The run was cancelled.
    Cancelled,
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCause::Timeout => write!(f, "timeout"),
            StopCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// The interpreter exited on its own.
    Exited {
        /// Exit status.
        status: i32,
    },
    /// The interpreter was killed.
    Stopped {
        /// Why it was killed.
        cause: StopCause,
        /// Exit status reported for the run.
        status: i32,
    },
    /// The run could not be carried out.
    Failed {
        /// Error message.
        message: String,
    },
}

impl RunStatus {
    /// Check if the interpreter exited with status 0.
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited { status: 0 })
    }

    /// The exit status, if the interpreter ran.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            RunStatus::Exited { status } | RunStatus::Stopped { status, .. } => Some(*status),
            RunStatus::Failed { .. } => None,
        }
    }
}

/// A diagnostic message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,
    /// Message.
    pub message: String,
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// Complete report of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID.
    pub run_id: RunId,
    /// Function that was called.
    pub function: String,
    /// Arguments it was called with.
    pub args: Vec<String>,
    /// Scripts sourced before the call.
    pub scripts: Vec<String>,
    /// Interpreter process ID.
    pub pid: Option<u32>,
    /// How the run ended.
    pub outcome: RunStatus,
    /// Wall-clock duration.
    pub elapsed: Duration,
    /// Retained script file, in debug mode.
    pub script_path: Option<String>,
    /// Diagnostic messages.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Create a report.
    pub fn new(run_id: RunId, function: impl Into<String>, outcome: RunStatus) -> Self {
        Self {
            run_id,
            function: function.into(),
            args: Vec::new(),
            scripts: Vec::new(),
            pid: None,
            outcome,
            elapsed: Duration::ZERO,
            script_path: None,
            diagnostics: Vec::new(),
        }
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set the sourced scripts.
    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Set the interpreter process ID.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Set the duration.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Set the retained script path.
    pub fn with_script_path(mut self, path: impl Into<String>) -> Self {
        self.script_path = Some(path.into());
        self
    }

    /// Add an info diagnostic.
    pub fn add_info(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Info, message.into());
    }

    /// Add a warning diagnostic.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Warning, message.into());
    }

    /// Add an error diagnostic.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Error, message.into());
    }

    fn push(&mut self, level: DiagnosticLevel, message: String) {
        self.diagnostics.push(Diagnostic { level, message });
    }

    /// Check if the run succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Format as human-readable text.
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Run Report: {}\n", self.run_id));
        output.push_str(&format!("Function: {}\n", self.function));
        if !self.args.is_empty() {
            output.push_str(&format!("Args: {:?}\n", self.args));
        }
        if !self.scripts.is_empty() {
            output.push_str(&format!("Scripts: {}\n", self.scripts.join(", ")));
        }
        if let Some(pid) = self.pid {
            output.push_str(&format!("PID: {}\n", pid));
        }
        output.push('\n');

        output.push_str("Outcome: ");
        match &self.outcome {
            RunStatus::Exited { status } => {
                output.push_str(&format!("Exited with status {}\n", status));
            }
            RunStatus::Stopped { cause, status } => {
                output.push_str(&format!("Stopped ({}), status {}\n", cause, status));
            }
            RunStatus::Failed { message } => {
                output.push_str(&format!("Failed: {}\n", message));
            }
        }
        output.push_str(&format!("Elapsed: {:?}\n", self.elapsed));
        if let Some(path) = &self.script_path {
            output.push_str(&format!("Script: {}\n", path));
        }

        if !self.diagnostics.is_empty() {
            output.push_str("\nDiagnostics:\n");
            for diag in &self.diagnostics {
                let level = match diag.level {
                    DiagnosticLevel::Info => "INFO",
                    DiagnosticLevel::Warning => "WARN",
                    DiagnosticLevel::Error => "ERROR",
                };
                output.push_str(&format!("  [{}] {}\n", level, diag.message));
            }
        }

        output
    }

    /// Format as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Format as pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_run_status() {
        assert!(RunStatus::Exited { status: 0 }.is_success());
        assert!(!RunStatus::Exited { status: 1 }.is_success());

        let stopped = RunStatus::Stopped {
            cause: StopCause::Timeout,
            status: 137,
        };
        assert!(!stopped.is_success());
        assert_eq!(stopped.exit_status(), Some(137));

        let failed = RunStatus::Failed {
            message: "spawn".into(),
        };
        assert_eq!(failed.exit_status(), None);
    }

    #[test]
    fn test_report_to_text() {
        let mut report = RunReport::new(
            RunId::new(),
            "main",
            RunStatus::Stopped {
                cause: StopCause::Timeout,
                status: 137,
            },
        )
        .with_scripts(vec!["app.sh".into()])
        .with_pid(42);
        report.add_warning("killed after 100ms");

        let text = report.to_text();
        assert!(text.contains("Function: main"));
        assert!(text.contains("Scripts: app.sh"));
        assert!(text.contains("Stopped (timeout), status 137"));
        assert!(text.contains("[WARN] killed after 100ms"));
    }

    #[test]
    fn test_report_to_json() {
        let report = RunReport::new(RunId::new(), "hello", RunStatus::Exited { status: 0 })
            .with_args(vec!["a".into()]);

        let json = report.to_json();
        assert_eq!(json["function"], "hello");
        assert_eq!(json["outcome"]["kind"], "exited");
        assert_eq!(json["outcome"]["status"], 0);
        assert_eq!(json["args"][0], "a");

        let parsed: RunReport = serde_json::from_str(&report.to_json_pretty()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert!(parsed.is_success());
    }
}
