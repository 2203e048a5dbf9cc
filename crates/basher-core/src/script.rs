//! Script materializer.
//!
//! Scripts are referred to by logical name and resolved through a
//! [`ScriptLoader`]. [`stage`] concatenates them in order so that sourcing
//! the result behaves like sourcing each script in turn: a function defined
//! twice keeps its last definition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LoadError, ScriptError, ScriptResult};

/// Resolves a logical script name to its source.
///
/// Loaders must return the same bytes for the same name within one process
/// lifetime. Staging does not cache, so a loader is called once per name
/// per run.
pub trait ScriptLoader: Send + Sync {
    /// Load the source of `name`.
    fn load(&self, name: &str) -> Result<Vec<u8>, LoadError>;
}

impl<F> ScriptLoader for F
where
    F: Fn(&str) -> std::io::Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<Vec<u8>, LoadError> {
        self(name).map_err(Into::into)
    }
}

/// Loader backed by an in-memory table, for embedded scripts.
#[derive(Debug, Clone, Default)]
pub struct MapLoader {
    scripts: HashMap<String, Vec<u8>>,
}

impl MapLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script.
    pub fn with(mut self, name: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        self.insert(name, source);
        self
    }

    /// Add or replace a script.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<Vec<u8>>) {
        self.scripts.insert(name.into(), source.into());
    }

    /// Check if a script is present.
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }
}

impl ScriptLoader for MapLoader {
    fn load(&self, name: &str) -> Result<Vec<u8>, LoadError> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no embedded script named '{}'", name).into())
    }
}

/// Loader that reads scripts relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptLoader for DirLoader {
    fn load(&self, name: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.root.join(name);
        std::fs::read(&path).map_err(|e| {
            LoadError::from(format!("cannot read {}: {}", path.display(), e))
        })
    }
}

/// Concatenated source for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedScript {
    names: Vec<String>,
    source: Vec<u8>,
}

impl StagedScript {
    /// Script names, in sourcing order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The concatenated source.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Check if nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consume into the raw source bytes.
    pub fn into_source(self) -> Vec<u8> {
        self.source
    }
}

/// Resolve `names` through `loader` and concatenate them.
///
/// Each source is newline-terminated before the next is appended. The
/// first failing name aborts staging; nothing is returned for the others.
pub fn stage<S: AsRef<str>>(names: &[S], loader: &dyn ScriptLoader) -> ScriptResult<StagedScript> {
    let mut staged = StagedScript::default();

    for name in names {
        let name = name.as_ref();
        let source = loader.load(name).map_err(|source| ScriptError::LoadFailed {
            name: name.to_string(),
            source,
        })?;

        debug!(script = name, bytes = source.len(), "Staged script");

        staged.source.extend_from_slice(&source);
        if !source.ends_with(b"\n") {
            staged.source.push(b'\n');
        }
        staged.names.push(name.to_string());
    }

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> MapLoader {
        MapLoader::new()
            .with("a.sh", "a() { echo a; }")
            .with("b.sh", "b() { echo b; }\n")
    }

    #[test]
    fn test_stage_in_order() {
        let staged = stage(&["a.sh", "b.sh"], &loader()).unwrap();
        assert_eq!(staged.names(), ["a.sh", "b.sh"]);
        assert_eq!(staged.source(), b"a() { echo a; }\nb() { echo b; }\n");
    }

    #[test]
    fn test_stage_duplicates_kept() {
        let staged = stage(&["a.sh", "a.sh"], &loader()).unwrap();
        assert_eq!(staged.names().len(), 2);
        assert_eq!(staged.source(), b"a() { echo a; }\na() { echo a; }\n");
    }

    #[test]
    fn test_stage_failure_names_script() {
        let err = stage(&["a.sh", "missing.sh", "b.sh"], &loader()).unwrap_err();
        match err {
            ScriptError::LoadFailed { name, .. } => assert_eq!(name, "missing.sh"),
        }
    }

    #[test]
    fn test_stage_empty() {
        let staged = stage::<&str>(&[], &loader()).unwrap();
        assert!(staged.is_empty());
        assert!(staged.source().is_empty());
    }

    #[test]
    fn test_closure_loader() {
        let loader = |name: &str| -> std::io::Result<Vec<u8>> {
            if name == "ok.sh" {
                Ok(b"true".to_vec())
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, name))
            }
        };

        assert!(stage(&["ok.sh"], &loader).is_ok());
        assert!(stage(&["nope.sh"], &loader).is_err());
    }

    #[test]
    fn test_dir_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.sh"), "lib() { :; }\n").unwrap();

        let loader = DirLoader::new(dir.path());
        assert_eq!(loader.load("lib.sh").unwrap(), b"lib() { :; }\n");
        assert!(loader.load("other.sh").is_err());
    }
}
