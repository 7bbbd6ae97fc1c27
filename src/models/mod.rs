//! Data model module
//!
//! `chat` holds the provider-agnostic domain types; `wire` holds the HTTP
//! surface payloads and the upstream openai-compatible raw shapes.

pub mod chat;
pub mod wire;

pub use chat::{
    ChatOptions, ChatRequest, ChatResponse, Delta, Message, Role, StreamChoice, StreamChunk,
    StreamOptions, ToolChoice, Usage,
};
