//! Note-writing agent for Loam.
//!
//! This crate implements the [`loam_core::Agent`] interface on top of the
//! OpenRouter chat completions API:
//!
//! - **client**: HTTP client with timeout and retry
//! - **prompts**: System prompt and message list for a context bundle
//! - **writer**: Turns note blocks in replies into note proposals
//!
//! # Environment Variables
//!
//! - `OPENROUTER_API_KEY`: API key (required)
//! - `OPENROUTER_MODEL`: Model to use (default: anthropic/claude-sonnet-4)

pub mod client;
pub mod prompts;
pub mod writer;

pub use client::{ChatMessage, OpenRouterClient, RetryPolicy};
pub use writer::{extract_note_blocks, NoteAgent};
