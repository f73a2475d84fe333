//! A generic `ChatModel` over any OpenAI-compatible chat-completions HTTP
//! endpoint. No vendor-specific behavior lives here (no thinking-model
//! reasoning extraction, no streaming) — the engine only ever asks this
//! provider for one structured JSON object per call.

use crate::chat::{ChatRequest, ChatResponse, Message, MessageRole};
use crate::config::HttpProviderConfig;
use crate::error::{LlmError, Result};
use crate::traits::ChatModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct HttpChatModel {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(config: HttpProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn convert_message(message: &Message) -> ProviderMessage {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::Human => "user",
            MessageRole::Assistant => "assistant",
        };
        ProviderMessage {
            role: role.to_string(),
            content: message.content.clone(),
        }
    }

    fn convert_response(response: ProviderResponse) -> Result<ChatResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        Ok(ChatResponse {
            message: Message::assistant(choice.message.content),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let messages: Vec<ProviderMessage> = request.messages.iter().map(Self::convert_message).collect();
        let output_schema = request.output_schema.clone();

        let response_format = request.output_schema.map(|schema| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "skill_output",
                    "schema": schema,
                    "strict": true,
                }
            })
        });

        let body = ProviderRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body);

        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(body_text),
                429 => LlmError::RateLimitExceeded(body_text),
                _ => LlmError::ProviderError(format!("{status}: {body_text}")),
            });
        }

        let parsed: ProviderResponse = response.json().await?;
        let chat_response = Self::convert_response(parsed)?;

        if let Some(schema) = output_schema {
            validate_against_schema(&schema, chat_response.text())?;
        }

        Ok(chat_response)
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(HttpChatModel::new(self.config.clone()))
    }
}

/// Confirms a model's JSON reply actually conforms to the schema it was
/// asked for. `strict: true` in the request should make this redundant for
/// providers that honor it, but not every OpenAI-compatible endpoint
/// enforces structured output server-side.
fn validate_against_schema(schema: &serde_json::Value, response_text: &str) -> Result<()> {
    let instance: serde_json::Value = serde_json::from_str(response_text)
        .map_err(|e| LlmError::SchemaValidation(format!("response was not valid JSON: {e}")))?;

    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| LlmError::SchemaValidation(format!("invalid output schema: {e}")))?;

    if let Err(mut errors) = compiled.validate(&instance) {
        let message = errors
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "schema validation failed".to_string());
        return Err(LlmError::SchemaValidation(message));
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ProviderRequest {
    model: String,
    messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProviderMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    choices: Vec<ProviderChoice>,
}

#[derive(Debug, Deserialize)]
struct ProviderChoice {
    message: ProviderMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_succeeds_with_valid_config() {
        let config = HttpProviderConfig::new("key", "https://api.openai.com/v1", "gpt-4o");
        let _model = HttpChatModel::new(config);
    }

    #[test]
    fn message_conversion_maps_roles_to_provider_strings() {
        let human = HttpChatModel::convert_message(&Message::human("hi"));
        assert_eq!(human.role, "user");
        let system = HttpChatModel::convert_message(&Message::system("be nice"));
        assert_eq!(system.role, "system");
    }

    #[test]
    fn schema_validation_accepts_a_conforming_reply() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"id": {}},
            "required": ["id"]
        });
        validate_against_schema(&schema, r#"{"id": "abc"}"#).unwrap();
    }

    #[test]
    fn schema_validation_rejects_a_missing_required_field() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"id": {}},
            "required": ["id"]
        });
        let err = validate_against_schema(&schema, r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, LlmError::SchemaValidation(_)));
    }

    #[test]
    fn schema_validation_rejects_non_json_output() {
        let schema = serde_json::json!({"type": "object"});
        let err = validate_against_schema(&schema, "not json").unwrap_err();
        assert!(matches!(err, LlmError::SchemaValidation(_)));
    }
}
