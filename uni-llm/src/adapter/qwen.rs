use crate::adapter::{
    AdapterKind, ProviderAdapter, ProviderRequest, bearer_headers, max_tokens, shape_error,
    temperature,
};
use crate::error::Result;
use crate::registry::ConnectionProfile;
use crate::transport::LineFraming;
use crate::types::{ChatMessage, GenerationOptions};
use serde::{Deserialize, Serialize};

/// Alibaba DashScope (Qwen). Messages nest under `input`, knobs under `parameters`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QwenAdapter;

#[derive(Debug, Serialize)]
struct QwenRequest<'a> {
    model: &'a str,
    input: QwenInput<'a>,
    parameters: QwenParameters,
}

#[derive(Debug, Serialize)]
struct QwenInput<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Serialize)]
struct QwenParameters {
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

impl ProviderAdapter for QwenAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Qwen
    }

    fn build_request(
        &self,
        profile: &ConnectionProfile,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ProviderRequest> {
        let req = QwenRequest {
            model: profile.model_name(),
            input: QwenInput { messages },
            parameters: QwenParameters {
                max_tokens: max_tokens(profile, options),
                temperature: temperature(profile, options),
                stream: options.stream,
            },
        };

        Ok(ProviderRequest {
            url: format!("{}/chat/completions", profile.base_endpoint()),
            headers: bearer_headers(profile)?,
            body: serde_json::to_value(&req)?,
            stream: options.stream,
            framing: LineFraming::DataPrefixed,
        })
    }

    fn extract_text(&self, raw: &serde_json::Value) -> Result<String> {
        let parsed = QwenResponse::deserialize(raw)
            .map_err(|e| shape_error(AdapterKind::Qwen, format_args!("did not parse: {e}")))?;
        let output = parsed
            .output
            .ok_or_else(|| shape_error(AdapterKind::Qwen, "missing output"))?;
        let choice = output
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| shape_error(AdapterKind::Qwen, "missing output.choices"))?;
        choice.message.content.ok_or_else(|| {
            shape_error(AdapterKind::Qwen, "missing output.choices[0].message.content")
        })
    }

    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String> {
        let output = QwenResponse::deserialize(fragment).ok()?.output?;
        let from_choice = output
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        from_choice.or(output.text).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct QwenResponse {
    #[serde(default)]
    output: Option<QwenOutput>,
}

#[derive(Debug, Deserialize)]
struct QwenOutput {
    #[serde(default)]
    choices: Vec<QwenChoice>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QwenChoice {
    message: QwenMessage,
}

#[derive(Debug, Deserialize)]
struct QwenMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::{conversation, profile};
    use crate::error::LlmError;
    use serde_json::json;

    #[test]
    fn request_nests_messages_and_parameters() {
        let p = profile(AdapterKind::Qwen, "https://dashscope.aliyuncs.com/api/v1", "qwen-turbo");
        let options = GenerationOptions::streaming().with_temperature(0.1);
        let req = QwenAdapter
            .build_request(&p, &conversation(), &options)
            .expect("builds");

        assert_eq!(req.url, "https://dashscope.aliyuncs.com/api/v1/chat/completions");
        assert_eq!(
            req.headers.get("authorization").expect("auth header"),
            "Bearer test-key"
        );
        assert_eq!(
            req.body,
            json!({
                "model": "qwen-turbo",
                "input": {
                    "messages": [
                        {"role": "system", "content": "be brief"},
                        {"role": "user", "content": "hello"},
                        {"role": "assistant", "content": "hi"},
                        {"role": "user", "content": "how are you?"},
                    ]
                },
                "parameters": {"max_tokens": 4000, "temperature": 0.1, "stream": true}
            })
        );
        assert!(req.body.get("messages").is_none());
    }

    #[test]
    fn extracts_output_choice_content() {
        let raw = json!({
            "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": "通义"}}]},
            "request_id": "r1"
        });
        assert_eq!(QwenAdapter.extract_text(&raw).expect("text"), "通义");
    }

    #[test]
    fn text_only_output_is_a_shape_error() {
        let err = QwenAdapter
            .extract_text(&json!({"output": {"text": "plain", "finish_reason": "stop"}}))
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseShape(_)));

        let err = QwenAdapter
            .extract_text(&json!({"choices": [{"message": {"content": "wrong level"}}]}))
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseShape(_)));
    }

    #[test]
    fn delta_reads_choice_then_text() {
        let choice = json!({"output": {"choices": [{"message": {"content": "a"}}]}});
        assert_eq!(QwenAdapter.extract_delta(&choice).as_deref(), Some("a"));

        let text = json!({"output": {"text": "b"}});
        assert_eq!(QwenAdapter.extract_delta(&text).as_deref(), Some("b"));

        assert_eq!(QwenAdapter.extract_delta(&json!({"usage": {}})), None);
    }
}
