//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod extract;
pub mod framework;
pub mod insight;
pub mod plan;
pub mod report;
pub mod safety;
pub mod similarity;
