//! docwatch - keeps a searchable index in step with a directory tree
//!
//! This crate provides:
//! - Event coalescing and debounced indexing of filesystem changes
//! - Text and image extraction routed by file type
//! - SQLite-backed per-collection vector index with embedding cache
//! - Retrieval question answering over the index

pub mod app;
pub mod cli;
pub mod config;
pub mod extract;
pub mod index;
pub mod paths;
pub mod pipeline;
pub mod query;

#[cfg(test)]
mod test_support;

pub use config::Config;
