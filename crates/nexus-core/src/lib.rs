//! Core types and error definitions for the NexusFS agent orchestrator.
//!
//! This crate provides the foundational types shared across the NexusFS
//! crates: the unified error enum and the AI provider contract that agent
//! variants consume for model inference.
//!
//! # Main types
//!
//! - [`NexusError`]: Unified error enum for orchestration, agents and I/O.
//! - [`NexusResult`]: Convenience alias for `Result<T, NexusError>`.
//! - [`AiMessage`]: A single chat message exchanged with an AI provider.
//! - [`AiProvider`]: Chat-completion capability injected into agents.

/// Error types.
pub mod error;
/// AI chat message types.
pub mod message;
/// AI provider capability trait.
pub mod provider;

pub use error::{NexusError, NexusResult};
pub use message::{AiMessage, AiRole};
pub use provider::{AiProvider, AiResponse, ChatOptions};
