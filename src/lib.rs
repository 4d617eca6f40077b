#![deny(missing_docs)]

//! Core library for pagemerge: fan document pages out to extraction processors, reconcile
//! their results into one text per page, score it, and cut it into chunks.

/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Orchestration, merging, quality scoring, and chunking.
pub mod processing;
/// Extraction processors and documents.
pub mod processors;
