//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure shared by the source and
//! metadata cores:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Nothing here knows about plugins or tags. Both cores take a
//! [`config::CoreConfig`] and an [`events::EventBus`] and report through
//! `tracing`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
