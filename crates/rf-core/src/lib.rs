//! rf-core: shared error type, configuration, stream request types, and the
//! source URL decoder.
//!
//! This crate is the foundational dependency for the other rf-* crates. It
//! performs no I/O beyond reading the config file.

pub mod config;
pub mod error;
pub mod media;
pub mod source;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
pub use source::{decode_source_url, encode_source_url};
