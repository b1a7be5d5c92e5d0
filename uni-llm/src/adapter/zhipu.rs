use crate::adapter::openai::{
    build_chat_completions_request, extract_chat_completions_delta, extract_chat_completions_text,
};
use crate::adapter::{AdapterKind, ProviderAdapter, ProviderRequest};
use crate::error::Result;
use crate::registry::ConnectionProfile;
use crate::types::{ChatMessage, GenerationOptions};

/// Zhipu GLM. Speaks the OpenAI chat completions shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhipuAdapter;

impl ProviderAdapter for ZhipuAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Zhipu
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
        extract_chat_completions_text(AdapterKind::Zhipu, raw)
    }

    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String> {
        extract_chat_completions_delta(fragment)
    }
}
