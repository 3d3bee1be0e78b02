//! I/O helpers: configuration, engine backends, embeddings, and the knowledge store.

pub mod config;
pub mod embedder;
pub mod engine;
pub mod knowledge;
pub mod offline;
pub mod process;
