//! # Event Bus System
//!
//! Provides an event-driven architecture for the core using `tokio::sync::broadcast`.
//! Source and metadata modules publish typed events; hosts subscribe to re-read
//! the plugin list or refresh track details.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   emit    ┌───────────┐
//! │ Source Module ├──────────>│           │
//! └───────────────┘           │ EventBus  │   subscribe   ┌────────────┐
//!                             │ (broadcast├──────────────>│ Subscriber │
//! ┌───────────────┐   emit    │  channel) │               └────────────┘
//! │ Tag Reader    ├──────────>│           │
//! └───────────────┘           └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SourceEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Source(SourceEvent::PluginRemoved {
//!         plugin_id: "kw".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Source plugin removed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns `Err`; publishers ignore it with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Source plugin and resolution events
    Source(SourceEvent),
    /// Tag reading events
    Metadata(MetadataEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Source(e) => e.description(),
            CoreEvent::Metadata(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Source(SourceEvent::ResolutionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Metadata(MetadataEvent::TagReadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Source(SourceEvent::PluginLoadFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Source(SourceEvent::PluginLoaded { .. })
            | CoreEvent::Source(SourceEvent::SourcesReady { .. })
            | CoreEvent::Source(SourceEvent::Resolved { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Source Events
// ============================================================================

/// Events emitted by the source plugin registry and the resolution engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SourceEvent {
    /// A plugin was loaded or replaced.
    PluginLoaded {
        plugin_id: String,
        name: String,
        /// Whether an existing plugin with the same id was replaced.
        replaced: bool,
    },
    /// Loading a plugin failed; the registry is unchanged.
    PluginLoadFailed {
        /// Where the script came from (URL, file name or "persisted").
        origin: String,
        message: String,
    },
    /// A plugin was removed.
    PluginRemoved { plugin_id: String },
    /// The selected plugin changed. `None` means no plugin is selected.
    SelectionChanged { plugin_id: Option<String> },
    /// Startup loading finished and the initialization gate opened.
    SourcesReady { loaded: usize, failed: usize },
    /// The engine is about to ask a different source for a URL.
    SourceSwitched {
        platform: String,
        track_id: String,
        quality: String,
    },
    /// A playable URL was resolved.
    Resolved {
        platform: String,
        track_id: String,
        quality: String,
    },
    /// A resolution ended without a URL.
    ResolutionFailed {
        message: String,
        rate_limited: bool,
    },
}

impl SourceEvent {
    fn description(&self) -> &str {
        match self {
            SourceEvent::PluginLoaded { .. } => "Source plugin loaded",
            SourceEvent::PluginLoadFailed { .. } => "Source plugin failed to load",
            SourceEvent::PluginRemoved { .. } => "Source plugin removed",
            SourceEvent::SelectionChanged { .. } => "Selected source changed",
            SourceEvent::SourcesReady { .. } => "Source plugins ready",
            SourceEvent::SourceSwitched { .. } => "Switching source",
            SourceEvent::Resolved { .. } => "Music URL resolved",
            SourceEvent::ResolutionFailed { .. } => "Music URL resolution failed",
        }
    }
}

// ============================================================================
// Metadata Events
// ============================================================================

/// Events emitted by the tag reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MetadataEvent {
    /// Tags were read from a file.
    TagsRead {
        /// File name only; directories are stripped.
        file: String,
        /// Frame kinds that were decoded.
        fields: Vec<String>,
    },
    /// The file does not carry a supported tag.
    UnrecognizedFormat { file: String },
    /// Reading failed with an I/O or range error.
    TagReadFailed { file: String, message: String },
}

impl MetadataEvent {
    fn description(&self) -> &str {
        match self {
            MetadataEvent::TagsRead { .. } => "Tags read",
            MetadataEvent::UnrecognizedFormat { .. } => "No supported tag found",
            MetadataEvent::TagReadFailed { .. } => "Tag reading failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let source_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Source(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn switched(platform: &str) -> CoreEvent {
        CoreEvent::Source(SourceEvent::SourceSwitched {
            platform: platform.to_string(),
            track_id: "t-1".to_string(),
            quality: "320k".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(switched("kw")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Source(SourceEvent::PluginLoaded {
            plugin_id: "kw".to_string(),
            name: "KW".to_string(),
            replaced: false,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Metadata(_)));

        bus.emit(switched("kw")).ok();

        let metadata_event = CoreEvent::Metadata(MetadataEvent::TagsRead {
            file: "song.mp3".to_string(),
            fields: vec!["title".to_string()],
        });
        bus.emit(metadata_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), metadata_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(switched(&format!("source-{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Source(SourceEvent::ResolutionFailed {
            message: "all sources exhausted".to_string(),
            rate_limited: false,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let load_failed = CoreEvent::Source(SourceEvent::PluginLoadFailed {
            origin: "persisted".to_string(),
            message: "syntax error".to_string(),
        });
        assert_eq!(load_failed.severity(), EventSeverity::Warning);

        let ready = CoreEvent::Source(SourceEvent::SourcesReady {
            loaded: 2,
            failed: 0,
        });
        assert_eq!(ready.severity(), EventSeverity::Info);

        assert_eq!(switched("kw").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(switched("kw").description(), "Switching source");
        let event = CoreEvent::Metadata(MetadataEvent::UnrecognizedFormat {
            file: "a.flac".to_string(),
        });
        assert_eq!(event.description(), "No supported tag found");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for _ in 0..10 {
                bus1.emit(switched("kw")).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(CoreEvent::Metadata(MetadataEvent::TagsRead {
                    file: format!("{}.mp3", i),
                    fields: Vec::new(),
                }))
                .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Source(SourceEvent::SelectionChanged {
            plugin_id: Some("kw".to_string()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Source\""));
        assert!(json.contains("\"event\":\"SelectionChanged\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(switched("tx")).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, switched("tx"));
    }
}
