#![deny(missing_docs)]

//! Core library for the DocQuest document assistant.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction and section detection for uploaded documents.
pub mod extract;
/// Text generation client abstraction and adapters.
pub mod generation;
/// In-memory cosine similarity index.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Document processing and query pipeline.
pub mod processing;
/// Prompt templates sent to the generation model.
pub mod prompts;
/// Retained processed documents and the active document pointer.
pub mod store;
