#![deny(missing_docs)]
//! Postpilot core library.
//!
//! Intent routing, per-platform post generation, the image edit pipeline and
//! conversation persistence shared by every transport.

/// Agents: super agent, post creator, platform agents, image improver.
pub mod agent;
/// Configuration management.
pub mod config;
/// Operational health report.
pub mod health;
/// LLM providers and client.
pub mod llm;
/// Image storage, hosting and editing backends.
pub mod media;
/// Conversation persistence (R2/S3 and in-memory).
pub mod storage;
/// Utility functions.
pub mod utils;

/// Shared mocks for unit tests.
#[cfg(test)]
pub mod testing;
