//! Observable events during interpreter runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::report::{RunId, StopCause};

/// Events that can be observed while a context runs functions.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Scripts were resolved and concatenated.
    ScriptsStaged {
        /// Run the scripts were staged for.
        run_id: RunId,
        /// Script names, in sourcing order.
        scripts: Vec<String>,
        /// Size of the concatenated source.
        bytes: usize,
    },
    /// The interpreter was spawned.
    RunStarted {
        /// Run ID.
        run_id: RunId,
        /// Function being called.
        function: String,
        /// Number of arguments.
        args: usize,
    },
    /// The interpreter exited on its own.
    RunCompleted {
        /// Run ID.
        run_id: RunId,
        /// Function that was called.
        function: String,
        /// Exit status.
        status: i32,
        /// Total duration.
        duration: Duration,
    },
    /// The interpreter was killed.
    RunStopped {
        /// Run ID.
        run_id: RunId,
        /// Function that was called.
        function: String,
        /// Why it was killed.
        cause: StopCause,
        /// Total duration.
        duration: Duration,
    },
    /// An exported function served a callback.
    DispatchHandled {
        /// Function name.
        function: String,
        /// Returned status.
        status: i32,
    },
    /// An error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

impl RunEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::ScriptsStaged { .. } => "scripts_staged",
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunStopped { .. } => "run_stopped",
            RunEvent::DispatchHandled { .. } => "dispatch_handled",
            RunEvent::Error { .. } => "error",
        }
    }

    /// The run this event belongs to, if any.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunEvent::ScriptsStaged { run_id, .. }
            | RunEvent::RunStarted { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunStopped { run_id, .. } => Some(*run_id),
            RunEvent::DispatchHandled { .. } | RunEvent::Error { .. } => None,
        }
    }
}

/// Subscriber for run events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &RunEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::ScriptsStaged {
                run_id,
                scripts,
                bytes,
            } => {
                tracing::debug!(
                    event = "scripts_staged",
                    run_id = %run_id,
                    scripts = ?scripts,
                    bytes,
                    "Scripts staged"
                );
            }
            RunEvent::RunStarted {
                run_id,
                function,
                args,
            } => {
                tracing::debug!(
                    event = "run_started",
                    run_id = %run_id,
                    function = %function,
                    args,
                    "Run started"
                );
            }
            RunEvent::RunCompleted {
                run_id,
                function,
                status,
                duration,
            } => {
                tracing::info!(
                    event = "run_completed",
                    run_id = %run_id,
                    function = %function,
                    status,
                    duration_ms = duration.as_millis(),
                    "Run completed"
                );
            }
            RunEvent::RunStopped {
                run_id,
                function,
                cause,
                duration,
            } => {
                tracing::warn!(
                    event = "run_stopped",
                    run_id = %run_id,
                    function = %function,
                    cause = %cause,
                    duration_ms = duration.as_millis(),
                    "Run stopped"
                );
            }
            RunEvent::DispatchHandled { function, status } => {
                tracing::debug!(
                    event = "dispatch_handled",
                    function = %function,
                    status,
                    "Dispatch handled"
                );
            }
            RunEvent::Error { message } => {
                tracing::error!(event = "error", message = %message, "Error occurred");
            }
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<(Instant, RunEvent)>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a subscriber keeping at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<(Instant, RunEvent)> {
        self.events.read().clone()
    }

    /// Get the type names of collected events, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .iter()
            .map(|(_, event)| event.event_type())
            .collect()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &RunEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push((Instant::now(), event.clone()));
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: RunEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            let wanted = subscriber
                .event_filter()
                .is_none_or(|filter| filter.contains(&event.event_type()));
            if wanted {
                subscriber.on_event(&event);
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StopsOnly(CollectingSubscriber);

    impl EventSubscriber for StopsOnly {
        fn on_event(&self, event: &RunEvent) {
            self.0.on_event(event);
        }

        fn event_filter(&self) -> Option<Vec<&'static str>> {
            Some(vec!["run_stopped"])
        }
    }

    fn started() -> RunEvent {
        RunEvent::RunStarted {
            run_id: RunId::new(),
            function: "main".to_string(),
            args: 0,
        }
    }

    #[test]
    fn test_event_type() {
        assert_eq!(started().event_type(), "run_started");
        assert!(started().run_id().is_some());

        let event = RunEvent::DispatchHandled {
            function: "f".to_string(),
            status: 2,
        };
        assert_eq!(event.event_type(), "dispatch_handled");
        assert!(event.run_id().is_none());
    }

    #[test]
    fn test_collecting_subscriber() {
        let subscriber = CollectingSubscriber::new(100);
        subscriber.on_event(&started());

        assert_eq!(subscriber.len(), 1);
        match &subscriber.events()[0].1 {
            RunEvent::RunStarted { function, .. } => assert_eq!(function, "main"),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_collecting_subscriber_max_events() {
        let subscriber = CollectingSubscriber::new(2);
        for _ in 0..5 {
            subscriber.on_event(&started());
        }
        assert_eq!(subscriber.len(), 2);
    }

    #[test]
    fn test_event_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let collector1 = Arc::new(CollectingSubscriber::new(100));
        let collector2 = Arc::new(CollectingSubscriber::new(100));

        dispatcher.subscribe(Arc::clone(&collector1) as Arc<dyn EventSubscriber>);
        dispatcher.subscribe(Arc::clone(&collector2) as Arc<dyn EventSubscriber>);
        dispatcher.emit(RunEvent::Error {
            message: "test error".to_string(),
        });

        assert_eq!(collector1.len(), 1);
        assert_eq!(collector2.len(), 1);
    }

    #[test]
    fn test_event_filter() {
        let dispatcher = EventDispatcher::new();
        let stops = Arc::new(StopsOnly(CollectingSubscriber::new(100)));
        dispatcher.subscribe(Arc::clone(&stops) as Arc<dyn EventSubscriber>);

        dispatcher.emit(started());
        dispatcher.emit(RunEvent::RunStopped {
            run_id: RunId::new(),
            function: "main".to_string(),
            cause: StopCause::Timeout,
            duration: Duration::from_millis(100),
        });

        assert_eq!(stops.0.event_types(), ["run_stopped"]);
    }
}
