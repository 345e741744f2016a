use super::{parse_tool_payload, LLMError, LLMProvider, LLMResponse, Message, MessageRole};
use crate::config::LLMConfig;
use async_trait::async_trait;
use sdk::ToolSchema;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &LLMConfig, api_key: impl Into<String>) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LLMError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Request body: system messages become `systemInstruction`, assistant turns
/// use the `model` role, tools go into one `functionDeclarations` block.
pub(crate) fn build_request_body(messages: &[Message], tools: &[ToolSchema]) -> Value {
    let mut contents = Vec::new();
    let mut system_parts = Vec::new();

    for msg in messages {
        if msg.role == MessageRole::System {
            system_parts.push(json!({ "text": msg.content }));
            continue;
        }
        contents.push(json!({
            "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
            "parts": [{ "text": msg.content }]
        }));
    }

    let mut payload = Map::new();
    payload.insert("contents".to_string(), json!(contents));
    if !system_parts.is_empty() {
        payload.insert(
            "systemInstruction".to_string(),
            json!({ "parts": system_parts }),
        );
    }
    if !tools.is_empty() {
        let declarations: Vec<Value> = tools.iter().map(|t| t.to_function_declaration()).collect();
        payload.insert(
            "tools".to_string(),
            json!([{ "functionDeclarations": declarations }]),
        );
    }
    Value::Object(payload)
}

/// Interpret a `generateContent` response body.
pub(crate) fn parse_response(data: &Value) -> super::Result<LLMResponse> {
    let Some(candidate) = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        if let Some(reason) = data.pointer("/promptFeedback/blockReason") {
            warn!("Gemini blocked the prompt: {}", reason);
            return Ok(LLMResponse::Empty);
        }
        return Err(LLMError::ParseError("No candidates in response".to_string()));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    // Native function calls take precedence over any text
    for part in &parts {
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| LLMError::ParseError("functionCall without name".to_string()))?;
            let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
            return Ok(LLMResponse::ToolCall {
                name: name.to_string(),
                arguments,
            });
        }
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Ok(LLMResponse::Empty);
    }

    if let Some(payload) = parse_tool_payload(&text) {
        debug!("Recovered tool payload from Gemini text");
        if let Some(name) = payload.get("tool").and_then(Value::as_str) {
            if payload.get("args").is_none() {
                let arguments = payload.get("kwargs").cloned().unwrap_or_else(|| json!({}));
                return Ok(LLMResponse::ToolCall {
                    name: name.to_string(),
                    arguments,
                });
            }
        }
    }

    Ok(LLMResponse::Text(text))
}

fn status_error(status: u16, text: String) -> LLMError {
    match status {
        429 => match LLMError::classify(text) {
            LLMError::Unknown(m) => LLMError::RateLimitExceeded(m),
            classified => classified,
        },
        401 | 403 => match LLMError::classify(text) {
            quota @ LLMError::QuotaExceeded(_) => quota,
            LLMError::RateLimitExceeded(m) | LLMError::Unknown(m) => {
                LLMError::AuthenticationFailed(m)
            }
            other => other,
        },
        400 | 404 => LLMError::InvalidRequest(text),
        _ => match LLMError::classify(format!("Gemini API error ({status}): {text}")) {
            LLMError::Unknown(m) => LLMError::ProviderUnavailable(m),
            classified => classified,
        },
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> super::Result<LLMResponse> {
        let payload = build_request_body(messages, tools);
        debug!(model = %self.model, messages = messages.len(), "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), text));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        parse_response(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::ToolParameter;

    #[test]
    fn test_request_body_roles_and_tools() {
        let messages = vec![
            Message::system("You are a coding agent"),
            Message::user("list files"),
            Message::assistant("ok"),
        ];
        let tools = vec![ToolSchema::new("read_file", "Read a file")
            .with_parameter(ToolParameter::new("path", "File path", true))];

        let body = build_request_body(&messages, &tools);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a coding agent"
        );
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "read_file"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"]["required"],
            json!(["path"])
        );
    }

    #[test]
    fn test_function_call_part_wins_over_text() {
        let data = json!({"candidates": [{"content": {"parts": [
            {"text": "thinking..."},
            {"functionCall": {"name": "grep", "args": {"pattern": "fn main"}}}
        ]}}]});
        assert_eq!(
            parse_response(&data).unwrap(),
            LLMResponse::ToolCall {
                name: "grep".into(),
                arguments: json!({"pattern": "fn main"})
            }
        );
    }

    #[test]
    fn test_text_json_fallback() {
        let data = json!({"candidates": [{"content": {"parts": [
            {"text": "```json\n{\"function\": \"read_file\", \"arguments\": {\"path\": \"a.rs\"}}\n```"}
        ]}}]});
        assert_eq!(
            parse_response(&data).unwrap(),
            LLMResponse::ToolCall {
                name: "read_file".into(),
                arguments: json!({"path": "a.rs"})
            }
        );
    }

    #[test]
    fn test_positional_payload_stays_text() {
        let raw = r#"{"tool": "ls", "args": ["src"]}"#;
        let data = json!({"candidates": [{"content": {"parts": [{"text": raw}]}}]});
        assert_eq!(parse_response(&data).unwrap(), LLMResponse::Text(raw.into()));
    }

    #[test]
    fn test_empty_and_blocked() {
        let empty = json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]});
        assert_eq!(parse_response(&empty).unwrap(), LLMResponse::Empty);

        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert_eq!(parse_response(&blocked).unwrap(), LLMResponse::Empty);

        assert!(matches!(
            parse_response(&json!({})),
            Err(LLMError::ParseError(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(429, "slow down".into()),
            LLMError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            status_error(403, "API key not valid".into()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(403, "Quota exceeded for project".into()),
            LLMError::QuotaExceeded(_)
        ));
        assert!(matches!(
            status_error(404, "no such model".into()),
            LLMError::InvalidRequest(_)
        ));
        assert!(matches!(
            status_error(503, "overloaded".into()),
            LLMError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(500, "RESOURCE_EXHAUSTED".into()),
            LLMError::RateLimitExceeded(_)
        ));
    }
}
