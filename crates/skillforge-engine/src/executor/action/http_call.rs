//! The `http_call` action sub-handler (§4.6.3): a synchronous HTTP request
//! for quick lookups, bounded by `timeout_ms`. Unlike the REST executor
//! (C6), this never pauses the run — the caller gets the response inline.

use crate::executor::llm::render_template;
use serde_json::{json, Value};
use skillforge_core::{ActionConfig, EngineError, ExecutorErrorKind, Result, Skill};
use std::collections::BTreeMap;

pub struct HttpCallHandler {
    client: reqwest::Client,
}

impl HttpCallHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn run(&self, skill: &Skill, config: &ActionConfig, resolved_inputs: &BTreeMap<String, Value>) -> Result<Value> {
        let ActionConfig::HttpCall { url_template, method, headers, .. } = config else {
            unreachable!("dispatched only for http_call configs")
        };

        let fatal = |message: String| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::HttpNon2xx,
            message,
        };

        let data_store = Value::Object(resolved_inputs.clone().into_iter().collect());
        let url = render_template(url_template, &data_store);
        let method = method.parse::<reqwest::Method>().map_err(|e| fatal(e.to_string()))?;

        let mut request = self.client.request(method, &url).json(&data_store);
        for (key, value) in headers {
            request = request.header(key, render_template(value, &data_store));
        }

        let response = request.send().await.map_err(|e| fatal(e.to_string()))?;
        let status_code = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .unwrap_or(Value::Null);

        if !(200..300).contains(&status_code) {
            return Err(fatal(format!("http call returned status {status_code}")));
        }

        Ok(json!({ "response": body, "status_code": status_code }))
    }
}

impl Default for HttpCallHandler {
    fn default() -> Self {
        Self::new()
    }
}
