//! Per-provider request builders and response normalizers.
//!
//! Every adapter turns the same canonical inputs into one provider's wire
//! format and reads that provider's responses back into plain text. Nothing
//! here performs I/O.

mod claude;
mod gemini;
mod openai;
mod qwen;
mod zhipu;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use qwen::QwenAdapter;
pub use zhipu::ZhipuAdapter;

use crate::error::{LlmError, Result};
use crate::registry::ConnectionProfile;
use crate::transport::LineFraming;
use crate::types::{ChatMessage, GenerationOptions, Role};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire-format family a connection profile speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    OpenAi,
    Claude,
    Qwen,
    Zhipu,
    Gemini,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 5] = [
        AdapterKind::OpenAi,
        AdapterKind::Claude,
        AdapterKind::Qwen,
        AdapterKind::Zhipu,
        AdapterKind::Gemini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::OpenAi => "openai",
            AdapterKind::Claude => "claude",
            AdapterKind::Qwen => "qwen",
            AdapterKind::Zhipu => "zhipu",
            AdapterKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        AdapterKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| LlmError::UnsupportedProvider(s.to_string()))
    }
}

/// A fully built HTTP call, ready for the transport.
#[derive(Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    pub stream: bool,
    pub framing: LineFraming,
}

impl ProviderRequest {
    /// The URL without its query string, safe to log.
    pub fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("url", &self.redacted_url())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body", &self.body)
            .field("stream", &self.stream)
            .field("framing", &self.framing)
            .finish()
    }
}

pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn build_request(
        &self,
        profile: &ConnectionProfile,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ProviderRequest>;

    /// Text of a buffered (non-streaming) response.
    fn extract_text(&self, raw: &serde_json::Value) -> Result<String>;

    /// Text carried by one streamed fragment, if any.
    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String>;
}

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static CLAUDE: ClaudeAdapter = ClaudeAdapter;
static QWEN: QwenAdapter = QwenAdapter;
static ZHIPU: ZhipuAdapter = ZhipuAdapter;
static GEMINI: GeminiAdapter = GeminiAdapter;

pub fn adapter_for(kind: AdapterKind) -> &'static dyn ProviderAdapter {
    match kind {
        AdapterKind::OpenAi => &OPENAI,
        AdapterKind::Claude => &CLAUDE,
        AdapterKind::Qwen => &QWEN,
        AdapterKind::Zhipu => &ZHIPU,
        AdapterKind::Gemini => &GEMINI,
    }
}

pub fn build_request(
    profile: &ConnectionProfile,
    messages: &[ChatMessage],
    options: &GenerationOptions,
) -> Result<ProviderRequest> {
    adapter_for(profile.adapter()).build_request(profile, messages, options)
}

pub fn extract_text(kind: AdapterKind, raw: &serde_json::Value) -> Result<String> {
    adapter_for(kind).extract_text(raw)
}

pub(crate) fn max_tokens(profile: &ConnectionProfile, options: &GenerationOptions) -> u32 {
    options.max_tokens.unwrap_or(profile.max_output_tokens())
}

pub(crate) fn temperature(profile: &ConnectionProfile, options: &GenerationOptions) -> f64 {
    options.temperature.unwrap_or(profile.temperature())
}

/// The content of the last system message (`None` if it is empty), and every
/// other message in order.
pub(crate) fn split_system(messages: &[ChatMessage]) -> (Option<&str>, Vec<&ChatMessage>) {
    let mut system = None;
    let mut rest = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System => system = Some(m.content.as_str()),
            Role::User | Role::Assistant => rest.push(m),
        }
    }
    (system.filter(|s| !s.is_empty()), rest)
}

pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

pub(crate) fn bearer_headers(profile: &ConnectionProfile) -> Result<HeaderMap> {
    let mut headers = json_headers();
    let value = format!("Bearer {}", profile.credential());
    headers.insert(AUTHORIZATION, secret_header(profile, &value)?);
    Ok(headers)
}

pub(crate) fn insert_secret_header(
    headers: &mut HeaderMap,
    name: &'static str,
    profile: &ConnectionProfile,
) -> Result<()> {
    let value = secret_header(profile, profile.credential())?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn secret_header(profile: &ConnectionProfile, value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        LlmError::InvalidInput(format!(
            "credential for provider {} is not a valid header value",
            profile.provider_id()
        ))
    })?;
    value.set_sensitive(true);
    Ok(value)
}

pub(crate) fn shape_error(provider: AdapterKind, what: impl fmt::Display) -> LlmError {
    LlmError::ResponseShape(format!("{provider} response {what}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::adapter::AdapterKind;
    use crate::registry::ConnectionProfile;
    use crate::types::ChatMessage;

    pub fn profile(kind: AdapterKind, base: &str, model: &str) -> ConnectionProfile {
        ConnectionProfile::new(kind.as_str(), kind, base, model).with_credential("test-key")
    }

    pub fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("how are you?"),
        ]
    }

    pub fn without_system() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello"), ChatMessage::assistant("hi")]
    }
}
