//! Provider-agnostic chat completions over several LLM HTTP APIs.
//!
//! Callers speak in [`ChatMessage`]s and [`GenerationOptions`]; each provider's
//! wire format is handled by an adapter in [`adapter`].

pub mod adapter;
mod client;
mod error;
mod registry;
mod transport;
mod types;

pub use adapter::{AdapterKind, ProviderRequest, adapter_for};
pub use client::{ChatOutcome, ChatStream, LlmClient, chat, simple_chat};
pub use error::{LlmError, Result};
pub use registry::{ConnectionProfile, ProviderRegistry, ProviderStatus};
pub use transport::{FragmentStream, LineFraming, Transport, TransportResponse};
pub use types::{ChatMessage, ChatResponse, GenerationOptions, Role, StreamChunk};
