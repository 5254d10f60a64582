//! # Host Bridge Traits
//!
//! Capability seams the cores rely on but never implement themselves.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - fetching plugin scripts from a URL
//! - [`FileSystemAccess`](storage::FileSystemAccess) - streaming audio files
//!   into the tag reader, reading plugin scripts from disk
//! - [`SettingsStore`](storage::SettingsStore) - persisting the plugin list
//! - [`LoggerSink`](time::LoggerSink) - forwarding structured logs to the host
//!
//! Desktop defaults live in `bridge-desktop`. Mobile hosts inject their own
//! adapters through `core_runtime::config::CoreConfig`.
//!
//! ## Error Handling
//!
//! Every bridge returns [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and keep the message actionable (include
//! the path or URL involved).
//!
//! ## Thread Safety
//!
//! All traits are `Send + Sync` so bridges can be shared as `Arc<dyn _>`
//! across tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore};
pub use time::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
