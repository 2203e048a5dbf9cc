//! Self re-execution envelope.
//!
//! A shell script calls back into the host by running the host binary again
//! with the argument vector:
//!
//! ```text
//! argv[0]  argv[1]  argv[2]  argv[3..]
//! program  :::      name     args...
//! ```
//!
//! The re-executed process recognises the sentinel before doing anything
//! else, runs the named export and exits with its status.

use crate::error::{HostError, HostResult};

/// Marker placed in `argv[1]` of a callback invocation.
pub const SENTINEL: &str = ":::";

/// Exit status used when a dispatched function cannot be found.
///
/// Matches the shell's status for a command that does not exist.
pub const DISPATCH_LOOKUP_STATUS: i32 = 127;

/// A parsed callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEnvelope {
    /// The program path from `argv[0]`.
    pub program: String,
    /// Exported function to call.
    pub function: String,
    /// Arguments for the function.
    pub args: Vec<String>,
}

impl DispatchEnvelope {
    /// Create an envelope.
    pub fn new(
        program: impl Into<String>,
        function: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse an argument vector.
    ///
    /// Returns `Ok(None)` when `argv[1]` is not the sentinel, and
    /// [`HostError::MalformedEnvelope`] when it is but no name follows.
    pub fn parse<S: AsRef<str>>(argv: &[S]) -> HostResult<Option<Self>> {
        match argv {
            [program, marker, rest @ ..] if marker.as_ref() == SENTINEL => match rest {
                [function, args @ ..] => Ok(Some(Self {
                    program: program.as_ref().to_string(),
                    function: function.as_ref().to_string(),
                    args: args.iter().map(|a| a.as_ref().to_string()).collect(),
                })),
                [] => Err(HostError::MalformedEnvelope),
            },
            _ => Ok(None),
        }
    }

    /// Check whether an argument vector carries the sentinel.
    pub fn is_dispatch<S: AsRef<str>>(argv: &[S]) -> bool {
        argv.get(1)
            .is_some_and(|marker| marker.as_ref() == SENTINEL)
    }

    /// Rebuild the argument vector.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        argv.push(self.program.clone());
        argv.push(SENTINEL.to_string());
        argv.push(self.function.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// What [`FunctionRegistry::handle_dispatch`](crate::FunctionRegistry::handle_dispatch) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The arguments were not a callback; normal startup should continue.
    NotDispatch,
    /// An exported function ran.
    Handled {
        /// The function that ran.
        function: String,
        /// Its exit status.
        status: i32,
    },
}

impl DispatchOutcome {
    /// The callback status, if one ran.
    pub fn status(&self) -> Option<i32> {
        match self {
            DispatchOutcome::NotDispatch => None,
            DispatchOutcome::Handled { status, .. } => Some(*status),
        }
    }

    /// Check if a callback ran.
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch() {
        let envelope = DispatchEnvelope::parse(&["prog", ":::", "myfunc", "abc", "123"])
            .unwrap()
            .unwrap();

        assert_eq!(envelope.program, "prog");
        assert_eq!(envelope.function, "myfunc");
        assert_eq!(envelope.args, ["abc", "123"]);
        assert_eq!(envelope.to_argv(), ["prog", ":::", "myfunc", "abc", "123"]);
    }

    #[test]
    fn test_parse_not_dispatch() {
        assert_eq!(DispatchEnvelope::parse(&["prog"]).unwrap(), None);
        assert_eq!(DispatchEnvelope::parse(&["prog", "run", ":::"]).unwrap(), None);
        assert_eq!(DispatchEnvelope::parse::<&str>(&[]).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(
            DispatchEnvelope::parse(&["prog", ":::"]),
            Err(HostError::MalformedEnvelope)
        );
    }

    #[test]
    fn test_parse_keeps_empty_and_sentinel_args() {
        let envelope = DispatchEnvelope::parse(&["prog", ":::", "f", "", ":::"])
            .unwrap()
            .unwrap();
        assert_eq!(envelope.args, ["", ":::"]);
    }

    #[test]
    fn test_is_dispatch() {
        assert!(DispatchEnvelope::is_dispatch(&["prog", ":::"]));
        assert!(!DispatchEnvelope::is_dispatch(&["prog", "::"]));
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(DispatchOutcome::NotDispatch.status(), None);
        let handled = DispatchOutcome::Handled {
            function: "f".into(),
            status: 2,
        };
        assert!(handled.is_handled());
        assert_eq!(handled.status(), Some(2));
    }
}
