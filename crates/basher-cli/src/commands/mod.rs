//! CLI command implementations.

pub mod exports;
pub mod run;
