//! Basher Observability
//!
//! This crate provides observability for interpreter runs:
//!
//! - [`EventDispatcher`]: Observable event system
//! - [`RunReport`]: Serializable summary of one run
//!
//! # Event Subscription
//!
//! ```ignore
//! use basher_observe::{EventDispatcher, LoggingSubscriber, RunEvent, RunId};
//! use std::sync::Arc;
//!
//! let dispatcher = EventDispatcher::new();
//! dispatcher.subscribe(Arc::new(LoggingSubscriber::new()));
//!
//! dispatcher.emit(RunEvent::RunStarted {
//!     run_id: RunId::new(),
//!     function: "main".to_string(),
//!     args: 0,
//! });
//! ```
//!
//! # Run Reports
//!
//! ```ignore
//! use basher_observe::{RunId, RunReport, RunStatus};
//!
//! let report = RunReport::new(RunId::new(), "main", RunStatus::Exited { status: 0 });
//! println!("{}", report.to_text());
//! ```

pub mod events;
pub mod report;

// Re-export main types
pub use events::{
    CollectingSubscriber, EventDispatcher, EventSubscriber, LoggingSubscriber, RunEvent,
};
pub use report::{Diagnostic, DiagnosticLevel, RunId, RunReport, RunStatus, StopCause};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::events::{EventDispatcher, EventSubscriber, RunEvent};
    pub use crate::report::{RunId, RunReport, RunStatus};
}
