use crate::adapter::{
    AdapterKind, ProviderAdapter, ProviderRequest, bearer_headers, max_tokens, shape_error,
    temperature,
};
use crate::error::Result;
use crate::registry::ConnectionProfile;
use crate::transport::LineFraming;
use crate::types::{ChatMessage, GenerationOptions};
use serde::{Deserialize, Serialize};

/// OpenAI chat completions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::OpenAi
    }

    fn build_request(
        &self,
        profile: &ConnectionProfile,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ProviderRequest> {
        build_chat_completions_request(profile, messages, options)
    }

    fn extract_text(&self, raw: &serde_json::Value) -> Result<String> {
        extract_chat_completions_text(AdapterKind::OpenAi, raw)
    }

    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String> {
        extract_chat_completions_delta(fragment)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

/// Shared with every OpenAI-compatible endpoint.
pub(crate) fn build_chat_completions_request(
    profile: &ConnectionProfile,
    messages: &[ChatMessage],
    options: &GenerationOptions,
) -> Result<ProviderRequest> {
    let req = ChatCompletionsRequest {
        model: profile.model_name(),
        messages,
        max_tokens: max_tokens(profile, options),
        temperature: temperature(profile, options),
        stream: options.stream,
    };

    Ok(ProviderRequest {
        url: format!("{}/chat/completions", profile.base_endpoint()),
        headers: bearer_headers(profile)?,
        body: serde_json::to_value(&req)?,
        stream: options.stream,
        framing: LineFraming::DataPrefixed,
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionsChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatCompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn extract_chat_completions_text(
    kind: AdapterKind,
    raw: &serde_json::Value,
) -> Result<String> {
    let parsed = ChatCompletionsResponse::deserialize(raw)
        .map_err(|e| shape_error(kind, format_args!("did not parse: {e}")))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| shape_error(kind, "missing choices"))?;
    choice
        .message
        .content
        .ok_or_else(|| shape_error(kind, "missing choices[0].message.content"))
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChunk {
    #[serde(default)]
    choices: Vec<ChatCompletionsStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsStreamChoice {
    #[serde(default)]
    delta: Option<ChatCompletionsDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsDelta {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn extract_chat_completions_delta(fragment: &serde_json::Value) -> Option<String> {
    let chunk = ChatCompletionsChunk::deserialize(fragment).ok()?;
    chunk
        .choices
        .into_iter()
        .next()?
        .delta?
        .content
        .filter(|s| !s.is_empty())
}
