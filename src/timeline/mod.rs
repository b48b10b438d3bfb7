// src/timeline/mod.rs

//! Timeline payloads: the data model, the permissive payload parser, and
//! the prompt-shaping helpers the filter consumes.

pub mod ingest;
pub mod prompt;
pub mod types;

pub use ingest::ingest;
pub use types::{FeedEntry, MediaRef, Post, Thread};
