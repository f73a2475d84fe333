//! # skillforge-llm — the `ChatModel` contract and a structured-output HTTP
//! provider.
//!
//! The orchestration engine never talks to a vendor SDK directly: every LLM
//! executor call goes through [`ChatModel`]. [`HttpChatModel`] implements it
//! over any OpenAI-compatible chat-completions endpoint; [`MockChatModel`]
//! implements it deterministically for tests.
//!
//! [`schema::build_output_schema`] turns a skill's `produces`/
//! `optional_produces` dotted paths into the JSON Schema an LLM executor
//! asks the model to conform to, so a skill's output contract is enforced
//! by the provider's structured-output support rather than by best-effort
//! text parsing downstream.

pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod schema;
pub mod traits;

pub use chat::{ChatRequest, ChatResponse, Message, MessageRole};
pub use config::HttpProviderConfig;
pub use error::{LlmError, LlmErrorKind, Result};
pub use http::HttpChatModel;
pub use schema::build_output_schema;
pub use traits::{ChatModel, MockChatModel};
