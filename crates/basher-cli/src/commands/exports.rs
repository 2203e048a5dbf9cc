//! Host commands exported to scripts.
//!
//! | Command                  | Effect                                  |
//! |--------------------------|-----------------------------------------|
//! | `basher-version`         | prints the CLI version                  |
//! | `basher-log LEVEL MSG..` | logs MSG at LEVEL on the CLI's stderr   |
//! | `basher-exit CODE`       | exits with CODE                         |

use std::sync::Arc;

use basher::basher_host::{
    DISPATCH_LOOKUP_STATUS, FunctionRegistry, FunctionRegistryBuilder, HostResult,
};

/// Status for a command called with bad arguments.
const USAGE_STATUS: i32 = 2;

/// Register the exported commands.
pub fn register(builder: &mut FunctionRegistryBuilder) -> HostResult<()> {
    builder
        .export_func("basher-version", version)?
        .export_func_with_status("basher-log", log)?
        .export_func_with_status("basher-exit", exit)?;
    Ok(())
}

/// Build a registry holding the exported commands.
pub fn registry() -> HostResult<Arc<FunctionRegistry>> {
    let mut builder = FunctionRegistry::builder();
    register(&mut builder)?;
    Ok(builder.build())
}

/// Serve a callback and return the status to exit with.
pub fn dispatch(argv: &[String]) -> i32 {
    let outcome = registry().and_then(|registry| registry.handle_dispatch(argv));
    match outcome {
        Ok(outcome) => outcome.status().unwrap_or(0),
        Err(e) => {
            eprintln!("basher: {}", e);
            DISPATCH_LOOKUP_STATUS
        }
    }
}

fn version(_args: &[String]) {
    println!("basher {}", env!("CARGO_PKG_VERSION"));
}

fn log(args: &[String]) -> i32 {
    let Some((level, words)) = args.split_first() else {
        eprintln!("usage: basher-log LEVEL MESSAGE...");
        return USAGE_STATUS;
    };
    let message = words.join(" ");

    match level.to_ascii_lowercase().as_str() {
        "error" => tracing::error!(target: "basher::script", "{}", message),
        "warn" => tracing::warn!(target: "basher::script", "{}", message),
        "info" => tracing::info!(target: "basher::script", "{}", message),
        "debug" => tracing::debug!(target: "basher::script", "{}", message),
        "trace" => tracing::trace!(target: "basher::script", "{}", message),
        other => {
            eprintln!("basher-log: unknown level '{}'", other);
            return USAGE_STATUS;
        }
    }
    0
}

fn exit(args: &[String]) -> i32 {
    match args.first().map(|code| code.parse::<i32>()) {
        Some(Ok(code)) => code,
        _ => {
            eprintln!("usage: basher-exit CODE");
            USAGE_STATUS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_registry_names() {
        let registry = registry().unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, ["basher-exit", "basher-log", "basher-version"]);
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(dispatch(&argv(&["basher", ":::", "basher-exit", "42"])), 42);
        assert_eq!(dispatch(&argv(&["basher", ":::", "basher-exit", "x"])), USAGE_STATUS);
        assert_eq!(dispatch(&argv(&["basher", ":::", "basher-exit"])), USAGE_STATUS);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log(&argv(&["info", "hello", "world"])), 0);
        assert_eq!(log(&argv(&["WARN", "loud"])), 0);
        assert_eq!(log(&argv(&["shout", "x"])), USAGE_STATUS);
        assert_eq!(log(&[]), USAGE_STATUS);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            dispatch(&argv(&["basher", ":::", "basher-nope"])),
            DISPATCH_LOOKUP_STATUS
        );
    }
}
