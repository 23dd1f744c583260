//! LLM provider layer for gantry.
//!
//! Each supported wire protocol has an adapter that encodes the shared
//! conversation model into its request format and decodes its streaming
//! reply into one normalized [`StreamEvent`] sequence. [`Provider`] wraps the
//! adapter chosen by [`resolve_model`] and [`ProviderKind`].

mod adapter;
mod anthropic;
mod client;
mod error;
mod gemini;
mod http;
mod kind;
mod openai;
mod resolve;
#[cfg(test)]
pub mod scripted;
mod sse;

pub use adapter::{EventStream, StreamEvent};
pub use client::Provider;
pub use error::ProviderError;
pub use kind::ProviderKind;
pub use resolve::{resolve_model, ModelSelection};
