//! The `ChatModel` trait: the seam every LLM executor call goes through.
//!
//! This is deliberately an orchestration-shaped contract, not a general
//! chat-client API — one `chat()` call in, one structured response out. A
//! real deployment swaps in any provider behind this trait; tests swap in
//! [`MockChatModel`].

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Whether this model is currently reachable. Defaults to `true`;
    /// providers that can cheaply check (e.g. a local server) may override.
    async fn is_available(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn ChatModel>;
}

impl Clone for Box<dyn ChatModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A deterministic test double: always returns the same canned response
/// text, regardless of the request. Useful for exercising the planner and
/// orchestrator without a network dependency.
pub struct MockChatModel {
    response_text: String,
}

impl MockChatModel {
    pub fn new(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
        }
    }

    /// Convenience constructor for tests that want a JSON object response.
    pub fn with_json(value: serde_json::Value) -> Self {
        Self::new(value.to_string())
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            message: crate::chat::Message::assistant(self.response_text.clone()),
        })
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(MockChatModel {
            response_text: self.response_text.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;
    use serde_json::json;

    #[tokio::test]
    async fn mock_model_returns_the_same_response_regardless_of_request() {
        let model = MockChatModel::with_json(json!({"status": "ok"}));
        let r1 = model
            .chat(ChatRequest::new(vec![Message::human("first")]))
            .await
            .unwrap();
        let r2 = model
            .chat(ChatRequest::new(vec![Message::human("second")]))
            .await
            .unwrap();
        assert_eq!(r1.text(), r2.text());
        assert_eq!(r1.text(), r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn boxed_chat_model_clones_independently() {
        let boxed: Box<dyn ChatModel> = Box::new(MockChatModel::new("hi"));
        let cloned = boxed.clone();
        let resp = cloned
            .chat(ChatRequest::new(vec![Message::human("x")]))
            .await
            .unwrap();
        assert_eq!(resp.text(), "hi");
    }
}
