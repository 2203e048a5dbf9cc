//! Configuration file support.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Settings read from a TOML file.
///
/// ```toml
/// interpreter = "/usr/local/bin/bash"
/// scripts = ["lib.sh", "app.sh"]
/// function = "main"
/// timeout_ms = 5000
/// copy_env = false
/// debug = false
///
/// [env]
/// GREETING = "hello"
/// ```
///
/// Relative script paths are resolved against the file's directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Bash executable.
    pub interpreter: Option<PathBuf>,
    /// Scripts sourced before any given on the command line.
    pub scripts: Vec<PathBuf>,
    /// Shell function to call.
    pub function: Option<String>,
    /// Run timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Start bash with the host environment.
    pub copy_env: Option<bool>,
    /// Keep staged scripts.
    pub debug: Option<bool>,
    /// Exported variables.
    pub env: BTreeMap<String, String>,
}

impl FileConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: FileConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.scripts = config
                .scripts
                .into_iter()
                .map(|script| if script.is_relative() { base.join(script) } else { script })
                .collect();
        }
        Ok(config)
    }
}

/// Parse a `NAME=VALUE` pair. The value may contain `=`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => bail!("expected NAME=VALUE, got '{}'", raw),
    }
}
