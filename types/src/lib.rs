//! Core domain types for shrinkwrap.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod message;
mod retention;

pub use message::{ChatMessage, ChatPayload, PayloadError, USER_ROLE};
pub use retention::{Retention, RetentionError, RetentionSpec};

/// Opaque token identifier produced by a tokenizer vocabulary.
pub type TokenId = u32;
