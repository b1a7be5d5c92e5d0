use crate::adapter::{
    AdapterKind, ProviderAdapter, ProviderRequest, insert_secret_header, json_headers, max_tokens,
    shape_error, split_system, temperature,
};
use crate::error::Result;
use crate::registry::ConnectionProfile;
use crate::transport::LineFraming;
use crate::types::{ChatMessage, GenerationOptions};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeAdapter;

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<&'a ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

impl ProviderAdapter for ClaudeAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Claude
    }

    fn build_request(
        &self,
        profile: &ConnectionProfile,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ProviderRequest> {
        let (system, rest) = split_system(messages);
        let req = ClaudeRequest {
            model: profile.model_name(),
            max_tokens: max_tokens(profile, options),
            temperature: temperature(profile, options),
            messages: rest,
            stream: options.stream,
            system,
        };

        let mut headers = json_headers();
        insert_secret_header(&mut headers, "x-api-key", profile)?;
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(ProviderRequest {
            url: format!("{}/v1/messages", profile.base_endpoint()),
            headers,
            body: serde_json::to_value(&req)?,
            stream: options.stream,
            framing: LineFraming::DataPrefixed,
        })
    }

    fn extract_text(&self, raw: &serde_json::Value) -> Result<String> {
        let parsed = ClaudeResponse::deserialize(raw)
            .map_err(|e| shape_error(AdapterKind::Claude, format_args!("did not parse: {e}")))?;
        let block = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| shape_error(AdapterKind::Claude, "missing content"))?;
        block
            .text
            .ok_or_else(|| shape_error(AdapterKind::Claude, "missing content[0].text"))
    }

    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String> {
        let event = ClaudeStreamEvent::deserialize(fragment).ok()?;
        if event.r#type != "content_block_delta" {
            return None;
        }
        event.delta?.text.filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeStreamEvent {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    delta: Option<ClaudeDelta>,
}

#[derive(Debug, Deserialize)]
struct ClaudeDelta {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::{conversation, profile, without_system};
    use crate::error::LlmError;
    use serde_json::json;

    #[test]
    fn system_moves_to_top_level_and_rest_keeps_order() {
        let p = profile(AdapterKind::Claude, "https://api.anthropic.com", "claude-3-sonnet-20240229");
        let req = ClaudeAdapter
            .build_request(&p, &conversation(), &GenerationOptions::default())
            .expect("builds");

        assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(req.headers.get("x-api-key").expect("key header"), "test-key");
        assert_eq!(
            req.headers.get("anthropic-version").expect("version header"),
            "2023-06-01"
        );
        assert!(req.headers.get("authorization").is_none());
        assert_eq!(
            req.body,
            json!({
                "model": "claude-3-sonnet-20240229",
                "max_tokens": 4000,
                "temperature": 0.7,
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi"},
                    {"role": "user", "content": "how are you?"},
                ],
                "stream": false,
                "system": "be brief",
            })
        );
    }

    #[test]
    fn no_system_message_omits_system_field() {
        let p = profile(AdapterKind::Claude, "http://c", "m");
        let req = ClaudeAdapter
            .build_request(&p, &without_system(), &GenerationOptions::default())
            .expect("builds");
        let body = req.body.as_object().expect("object body");
        assert!(!body.contains_key("system"));
    }

    #[test]
    fn empty_system_message_is_omitted_too() {
        let p = profile(AdapterKind::Claude, "http://c", "m");
        let messages = vec![ChatMessage::system(""), ChatMessage::user("q")];
        let req = ClaudeAdapter
            .build_request(&p, &messages, &GenerationOptions::default())
            .expect("builds");
        assert!(req.body.get("system").is_none());
    }

    #[test]
    fn extracts_first_content_block_text() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Bonjour"}],
            "stop_reason": "end_turn"
        });
        assert_eq!(ClaudeAdapter.extract_text(&raw).expect("text"), "Bonjour");
    }

    #[test]
    fn missing_text_is_a_shape_error() {
        let err = ClaudeAdapter.extract_text(&json!({"content": []})).unwrap_err();
        assert!(matches!(err, LlmError::ResponseShape(_)));

        let tool_first = json!({"content": [{"type": "tool_use", "id": "t", "name": "x", "input": {}}]});
        let err = ClaudeAdapter.extract_text(&tool_first).unwrap_err();
        assert!(matches!(err, LlmError::ResponseShape(_)));
    }

    #[test]
    fn delta_only_from_content_block_delta_events() {
        let delta = json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}});
        assert_eq!(ClaudeAdapter.extract_delta(&delta).as_deref(), Some("Hi"));

        let start = json!({"type": "message_start", "message": {"id": "m"}});
        assert_eq!(ClaudeAdapter.extract_delta(&start), None);

        let stop = json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}});
        assert_eq!(ClaudeAdapter.extract_delta(&stop), None);
    }
}
