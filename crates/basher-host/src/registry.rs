//! Exported host functions.
//!
//! Functions are collected by a [`FunctionRegistryBuilder`] and frozen into
//! a [`FunctionRegistry`] before any interpreter runs. The frozen registry
//! does two things: it renders the shell shims that forward calls back to
//! the host binary, and it serves those calls when the binary is
//! re-executed with the dispatch sentinel.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use basher_core::env::quote;
use tracing::{debug, info};

use crate::dispatch::{DispatchEnvelope, DispatchOutcome, SENTINEL};
use crate::error::{HostError, HostResult};

type Callback = Arc<dyn Fn(&[String]) -> i32 + Send + Sync>;

/// A host function callable from shell scripts.
#[derive(Clone)]
pub struct ExportedFunction {
    name: String,
    callback: Callback,
}

impl ExportedFunction {
    /// The name scripts call the function by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function and return its status.
    pub fn call(&self, args: &[String]) -> i32 {
        (self.callback)(args)
    }
}

impl std::fmt::Debug for ExportedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Check that `name` can be declared as a shell function and exported.
pub fn validate_name(name: &str) -> HostResult<()> {
    if name.is_empty() {
        return Err(HostError::EmptyName);
    }
    if name == SENTINEL {
        return Err(HostError::ReservedName);
    }
    let valid = !name.starts_with('-')
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '+' | '@' | '%')
        });
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidName(name.to_string()))
    }
}

/// Collects exported functions.
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    functions: BTreeMap<String, ExportedFunction>,
}

impl FunctionRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a function that always exits with status 0.
    pub fn export_func<F>(&mut self, name: impl Into<String>, func: F) -> HostResult<&mut Self>
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.export_func_with_status(name, move |args: &[String]| {
            func(args);
            0
        })
    }

    /// Export a function whose return value becomes its exit status.
    ///
    /// Exporting a name twice keeps the later function.
    pub fn export_func_with_status<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> HostResult<&mut Self>
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name)?;

        let function = ExportedFunction {
            name: name.clone(),
            callback: Arc::new(func),
        };
        if self.functions.insert(name.clone(), function).is_some() {
            debug!(function = %name, "Replaced exported function");
        } else {
            debug!(function = %name, "Exported function");
        }
        Ok(self)
    }

    /// Check if a name has been exported.
    pub fn is_exported(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of exported functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if nothing has been exported.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<FunctionRegistry> {
        info!(functions = self.functions.len(), "Built function registry");
        Arc::new(FunctionRegistry {
            functions: self.functions,
        })
    }
}

impl std::fmt::Debug for FunctionRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistryBuilder")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Frozen set of exported functions.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, ExportedFunction>,
}

impl FunctionRegistry {
    /// Start building a registry.
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// An empty registry.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a function.
    pub fn get(&self, name: &str) -> Option<&ExportedFunction> {
        self.functions.get(name)
    }

    /// Exported names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Number of exported functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Serve a callback if `argv` is a dispatch envelope.
    ///
    /// The function runs synchronously on the calling thread. Nothing is
    /// printed and the process is not exited; see the facade crate for the
    /// exiting variant.
    pub fn handle_dispatch<S: AsRef<str>>(&self, argv: &[S]) -> HostResult<DispatchOutcome> {
        let Some(envelope) = DispatchEnvelope::parse(argv)? else {
            return Ok(DispatchOutcome::NotDispatch);
        };

        let function = self
            .get(&envelope.function)
            .ok_or_else(|| HostError::UnknownFunction(envelope.function.clone()))?;

        debug!(
            function = %envelope.function,
            args = envelope.args.len(),
            "Dispatching exported function"
        );
        let status = function.call(&envelope.args);
        debug!(function = %envelope.function, status, "Exported function returned");

        Ok(DispatchOutcome::Handled {
            function: envelope.function,
            status,
        })
    }

    /// Render one shell function per export that re-executes `self_path`.
    ///
    /// ```text
    /// name() { '/path/to/host' ':::' 'name' "$@"; }
    /// ```
    pub fn shell_shims(&self, self_path: &Path) -> String {
        let program = quote(&self_path.to_string_lossy());
        let sentinel = quote(SENTINEL);

        let mut shims = String::new();
        for name in self.functions.keys() {
            shims.push_str(&format!(
                "{}() {{ {} {} {} \"$@\"; }}\n",
                name,
                program,
                sentinel,
                quote(name)
            ));
        }
        shims
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}
