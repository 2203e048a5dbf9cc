//! Run command - Source scripts and call a shell function.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use basher::prelude::*;
use basher::{DEBUG_ENV, default_interpreter};

use crate::config::FileConfig;
use crate::{Cli, LOG_ENV, ReportFormat};

/// Execute the run command and return the script's exit status.
pub fn execute(cli: Cli, log_directive: &str) -> Result<i32> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut scripts = file.scripts.clone();
    scripts.extend(cli.scripts.iter().cloned());
    if scripts.is_empty() {
        bail!("No scripts given");
    }

    let interpreter = cli
        .interpreter
        .clone()
        .or(file.interpreter.clone())
        .unwrap_or_else(default_interpreter);
    let function = cli
        .function
        .clone()
        .or(file.function.clone())
        .unwrap_or_else(|| "main".to_string());
    let debug = cli.debug
        || file.debug.unwrap_or(false)
        || std::env::var_os(DEBUG_ENV).is_some_and(|value| !value.is_empty());
    let copy_env = !cli.no_copy_env && file.copy_env.unwrap_or(true);
    let timeout = cli
        .timeout_ms
        .or(file.timeout_ms)
        .map(Duration::from_millis);

    let mut builder = Basher::builder(&interpreter)
        .with_debug(debug)
        .with_copy_env(copy_env)
        .with_loader(DirLoader::new(""))
        .with_event_subscriber(Arc::new(LoggingSubscriber::new()));
    crate::commands::exports::register(builder.functions_mut())
        .context("Failed to export host commands")?;

    for script in &scripts {
        builder = builder.source(script.to_string_lossy());
    }

    builder = builder
        .export(LOG_ENV, log_directive)
        .context("Failed to export log filter")?;
    for (name, value) in file.env.iter().map(|(n, v)| (n.as_str(), v.as_str())) {
        builder = builder
            .export(name, value)
            .with_context(|| format!("Invalid variable in config file: {}", name))?;
    }
    for (name, value) in &cli.env {
        builder = builder
            .export(name.as_str(), value.as_str())
            .with_context(|| format!("Invalid variable: {}", name))?;
    }

    let context = builder
        .build()
        .with_context(|| format!("Failed to set up {}", interpreter.display()))?;

    tracing::info!(
        function = %function,
        scripts = scripts.len(),
        args = cli.args.len(),
        "Running function"
    );

    let mut options = RunOptions::new();
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }

    if cli.report == ReportFormat::None {
        let outcome = context
            .run_outcome(&function, cli.args.iter().cloned(), options)
            .with_context(|| format!("Failed to run '{}'", function))?;
        return Ok(outcome.status);
    }

    let report = context.run_report(&function, cli.args.iter().cloned(), options);
    match cli.report {
        ReportFormat::Json => eprintln!("{}", report.to_json_pretty()),
        _ => eprint!("{}", report.to_text()),
    }

    match &report.outcome {
        RunStatus::Failed { message } => bail!("Failed to run '{}': {}", function, message),
        outcome => Ok(outcome.exit_status().unwrap_or(1)),
    }
}
