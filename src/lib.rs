//! Compressed image variant cache
//!
//! Materialises named transforms of source images on disk, optionally runs
//! each new variant through the Tinify compression API, and hands out
//! read-only handles to the cached files. Concurrent requests for the same
//! variant share one generation, and an operator flush forces regeneration
//! until the process restarts.

pub mod app;
pub mod cache;
pub mod compression;
pub mod compressor;
pub mod coordinator;
pub mod error;
pub mod flush;
pub mod models;
pub mod store;
pub mod transform;

pub use error::{Error, Result};
