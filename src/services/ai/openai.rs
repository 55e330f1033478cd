use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{LlmProvider, LlmReply};

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f64 = 0.7;

/// Any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system: &str, user: &str, functions: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        if !functions.is_empty() {
            let tools: Vec<Value> = functions
                .iter()
                .map(|f| json!({ "type": "function", "function": f }))
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str, functions: &[Value]) -> anyhow::Result<LlmReply> {
        let body = self.request_body(system, user, functions);

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call chat completions API")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse chat completions response")?;

        if !status.is_success() {
            anyhow::bail!("chat completions API error ({}): {}", status, data);
        }

        parse_reply(&data["choices"][0]["message"])
    }
}

/// Reads `tool_calls[0].function`, the legacy `function_call`, or plain
/// `content`, in that order.
pub fn parse_reply(message: &Value) -> anyhow::Result<LlmReply> {
    let call = message["tool_calls"][0]["function"]
        .as_object()
        .or_else(|| message["function_call"].as_object());

    if let Some(call) = call {
        let name = call
            .get("name")
            .and_then(Value::as_str)
            .context("function call without a name")?
            .to_string();
        let arguments = match call.get("arguments") {
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .with_context(|| format!("malformed arguments for {name}"))?,
            Some(other) => other.clone(),
            None => json!({}),
        };
        return Ok(LlmReply::FunctionCall { name, arguments });
    }

    message["content"]
        .as_str()
        .map(|s| LlmReply::Text(s.trim().to_string()))
        .ok_or_else(|| anyhow::anyhow!("missing content in chat completions response"))
}
