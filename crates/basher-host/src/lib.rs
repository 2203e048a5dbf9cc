//! Basher Host Functions
//!
//! This crate lets shell scripts call back into the host program. It
//! includes:
//!
//! - [`FunctionRegistry`]: Frozen set of exported functions
//! - [`FunctionRegistryBuilder`]: Collects exports before the first run
//! - [`DispatchEnvelope`]: The `[program, ":::", name, args...]` argv shape
//!
//! # Callbacks
//!
//! Every export becomes a shell function in the interpreter that re-runs
//! the host binary with the dispatch sentinel. The host must therefore
//! check its arguments for a dispatch before doing anything else.
//!
//! # Example
//!
//! ```ignore
//! use basher_host::FunctionRegistry;
//!
//! let mut builder = FunctionRegistry::builder();
//! builder.export_func_with_status("notify", |args: &[String]| {
//!     eprintln!("notified: {:?}", args);
//!     0
//! })?;
//! let registry = builder.build();
//!
//! let argv: Vec<String> = std::env::args().collect();
//! if let Some(status) = registry.handle_dispatch(&argv)?.status() {
//!     std::process::exit(status);
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod registry;

// Re-export main types
pub use dispatch::{DISPATCH_LOOKUP_STATUS, DispatchEnvelope, DispatchOutcome, SENTINEL};
pub use error::{HostError, HostResult};
pub use registry::{ExportedFunction, FunctionRegistry, FunctionRegistryBuilder, validate_name};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dispatch::{DispatchOutcome, SENTINEL};
    pub use crate::error::{HostError, HostResult};
    pub use crate::registry::{FunctionRegistry, FunctionRegistryBuilder};
}
