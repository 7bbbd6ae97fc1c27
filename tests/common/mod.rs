//! Shared test fixtures
//!
//! Stub providers standing in for upstream clients, plus router helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use aigateway::config::Settings;
use aigateway::models::chat::{
    ChatRequest, ChatResponse, Delta, StreamChoice, StreamChunk,
};
use aigateway::providers::{ChunkCallback, Provider, ProviderRegistry};
use aigateway::utils::error::{ProviderError, ProviderResult};

/// Scriptable provider stub: fails the first `fail_times` calls with
/// `fail_status`, then succeeds (or keeps failing when no response is set).
pub struct StubProvider {
    name: String,
    pub calls: AtomicU32,
    fail_times: u32,
    fail_status: u16,
    response: Option<(String, String)>,
    deltas: Vec<String>,
    stream_error_after_deltas: Option<u16>,
}

impl StubProvider {
    /// Always succeed with the given id and content.
    pub fn ok(name: &str, id: &str, content: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            fail_times: 0,
            fail_status: 0,
            response: Some((id.to_string(), content.to_string())),
            deltas: vec![content.to_string()],
            stream_error_after_deltas: None,
        })
    }

    /// Fail `times` calls with `status`, then succeed.
    pub fn fail_then_ok(name: &str, times: u32, status: u16, id: &str, content: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            fail_times: times,
            fail_status: status,
            response: Some((id.to_string(), content.to_string())),
            deltas: vec![content.to_string()],
            stream_error_after_deltas: None,
        })
    }

    /// Fail every call with `status`.
    pub fn always_fail(name: &str, status: u16) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            fail_status: status,
            response: None,
            deltas: Vec::new(),
            stream_error_after_deltas: None,
        })
    }

    /// Stream the given deltas, then terminate cleanly.
    pub fn streaming(name: &str, id: &str, deltas: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            fail_times: 0,
            fail_status: 0,
            response: Some((id.to_string(), deltas.concat())),
            deltas: deltas.iter().map(|s| s.to_string()).collect(),
            stream_error_after_deltas: None,
        })
    }

    /// Stream the given deltas, then fail with `status`.
    pub fn streaming_fail_after(name: &str, deltas: &[&str], status: u16) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            fail_times: 0,
            fail_status: status,
            response: Some(("stub".to_string(), deltas.concat())),
            deltas: deltas.iter().map(|s| s.to_string()).collect(),
            stream_error_after_deltas: Some(status),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> ProviderError {
        ProviderError::new(self.fail_status, "stub failure", "api_error", "stub_error")
    }

    fn raw_body(&self, id: &str, content: &str) -> Vec<u8> {
        serde_json::json!({
            "id": id,
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "stub-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
        .to_string()
        .into_bytes()
    }

    fn delta_chunk(&self, id: &str, index: usize, delta: &str) -> StreamChunk {
        StreamChunk {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1_700_000_000,
            model: "stub-model".to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta: Delta {
                    role: (index == 0).then(|| "assistant".to_string()),
                    content: Some(delta.to_string()),
                    tool_calls: Vec::new(),
                },
                finish_reason: None,
                logprobs: None,
            }],
            raw: format!(r#"{{"id":"{id}","choices":[]}}"#).into_bytes(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, _request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call < self.fail_times {
            return Err(self.failure());
        }

        let Some((id, content)) = &self.response else {
            return Err(self.failure());
        };

        Ok(ChatResponse {
            id: id.clone(),
            model: "stub-model".to_string(),
            content: content.clone(),
            raw: self.raw_body(id, content),
        })
    }

    async fn chat_stream(
        &self,
        _request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call < self.fail_times {
            return Err(self.failure());
        }

        let id = self
            .response
            .as_ref()
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| "stub".to_string());

        for (index, delta) in self.deltas.iter().enumerate() {
            on_chunk(&self.delta_chunk(&id, index, delta))?;
        }

        if let Some(status) = self.stream_error_after_deltas {
            return Err(ProviderError::new(
                status,
                "stub stream failure",
                "api_error",
                "stub_stream_error",
            ));
        }

        Ok(())
    }
}

/// Settings suited for tests: default limits, small body cap left at default.
pub fn test_settings() -> Settings {
    Settings::default()
}

/// Registry with the given providers registered under their names.
pub fn registry_with(providers: &[Arc<StubProvider>]) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new(false));
    for provider in providers {
        registry.register(provider.name().to_string(), Arc::clone(provider) as Arc<dyn Provider>);
    }
    registry
}
