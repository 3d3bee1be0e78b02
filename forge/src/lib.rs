//! Retrieval-augmented plan-to-code pipeline.
//!
//! Turns a free-text software request into generated source files by chaining
//! memory-backed prompt composition, a validation gate, plan production, and
//! code synthesis. The layout keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, status lattice,
//!   safety denylist, plan normalization, graph wiring, similarity). No I/O.
//! - **[`io`]**: Side effects (config file, reasoning-engine processes,
//!   embeddings, knowledge-store persistence). Behind traits so tests can
//!   script them.
//!
//! Orchestration modules ([`compose`], [`validate`], [`planner`],
//! [`synthesize`], [`pipeline`]) coordinate core logic with I/O.

pub mod compose;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod planner;
pub mod prompt;
pub mod synthesize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
