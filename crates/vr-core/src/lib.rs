//! vr-core: shared types, errors, configuration, and sandbox rules.
//!
//! This crate is the foundational dependency for the other vr-* crates and
//! the `vidrelay` server, providing the error taxonomy, application
//! configuration, path/file name validation, the timestamp grammar, and the
//! progress event type.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod media;
pub mod timestamp;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use events::{ProgressEvent, ProgressSender};
pub use guard::{is_safe_path, sanitize_filename, PathGuard};
pub use media::MediaReference;
pub use timestamp::{validate_timestamp, Timestamp};
