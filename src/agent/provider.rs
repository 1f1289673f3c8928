//! Fallback provider contract — the outbound side of an escalation.
//!
//! Narrowed to the shape the controller's escalation path actually needs:
//! `call(provider, prompt, model, params) -> AgentResponse`. Vendor wire
//! calls themselves remain an external collaborator; this trait is the seam
//! a deployment plugs a real SDK shim into.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;

use super::response::AgentResponse;

#[async_trait]
pub trait FallbackProvider: Send + Sync {
    /// Human-readable identifier used as the Budget Guard's provider key.
    fn name(&self) -> &str;

    async fn call(&self, prompt: &str, model: &str, params: &Value) -> anyhow::Result<AgentResponse>;
}

/// Calls an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    provider_name: String,
}

impl OpenAICompatibleProvider {
    pub fn new(provider_name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            provider_name: provider_name.into(),
        }
    }
}

#[async_trait]
impl FallbackProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn call(&self, prompt: &str, model: &str, params: &Value) -> anyhow::Result<AgentResponse> {
        let start = Instant::now();

        let mut body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Value::Object(extra) = params {
            if let Value::Object(ref mut map) = body {
                for (k, v) in extra {
                    map.insert(k.clone(), v.clone());
                }
            }
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let value: Value = res.json().await?;

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let tokens_in = value["usage"]["prompt_tokens"].as_u64().map(|v| v as u32);
        let tokens_out = value["usage"]["completion_tokens"].as_u64().map(|v| v as u32);

        let mut response = AgentResponse::new(content, model, start.elapsed().as_millis() as u64);
        if let (Some(ti), Some(to)) = (tokens_in, tokens_out) {
            response = response.with_tokens(ti, to);
        }
        Ok(response)
    }
}
