//! note-forge: autonomous batch pipeline for AI-written study notes.
//!
//! Topics are queued as work items, drafted into outlines, optionally held
//! for human review, expanded into full notes and stored as artifacts. All
//! generator calls share one retry executor and circuit breaker, and every
//! queue mutation is persisted and broadcast to subscribers.

pub mod cli;
pub mod error;
pub mod generator;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod storage;

pub use error::{GeneratorError, LlmError, PersistenceError};
