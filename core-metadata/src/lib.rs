//! # Tag Reading Module
//!
//! Streams ID3v2 tags out of local audio files with bounded memory.
//!
//! ## Overview
//!
//! - [`cursor::ByteCursor`] - read position over one in-memory chunk
//! - [`loader::ChunkLoader`] - refills the cursor from an async reader
//! - [`decoder::FrameDecoder`] - header and frame state machine
//! - [`reader::TagReader`] - entry point for files, host streams and buffers
//!
//! Title, artist, album, genre and attached picture frames are decoded.
//! Files without a supported tag yield `Ok(None)` rather than an error.

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod frames;
pub mod loader;
pub mod reader;
pub mod text;

pub use error::{Result, TagError};
pub use frames::{FieldSelection, FrameKind, FrameValue, Picture, TagFrameSet};
pub use reader::TagReader;
