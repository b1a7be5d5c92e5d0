use crate::adapter::{
    AdapterKind, ProviderAdapter, ProviderRequest, json_headers, max_tokens, shape_error,
    split_system, temperature,
};
use crate::error::{LlmError, Result};
use crate::registry::ConnectionProfile;
use crate::transport::LineFraming;
use crate::types::{ChatMessage, GenerationOptions, Role};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Google Gemini `generateContent`. The key travels in the query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    }
}

fn to_gemini_content(m: &ChatMessage) -> GeminiContent<'_> {
    GeminiContent {
        role: gemini_role(m.role),
        parts: vec![GeminiPart { text: &m.content }],
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Gemini
    }

    fn build_request(
        &self,
        profile: &ConnectionProfile,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ProviderRequest> {
        let (system, rest) = split_system(messages);
        let req = GeminiRequest {
            contents: rest.into_iter().map(to_gemini_content).collect(),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: max_tokens(profile, options),
                temperature: temperature(profile, options),
            },
            system_instruction: system.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart { text }],
            }),
        };

        let method = if options.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        let mut url = Url::parse(&format!(
            "{}/models/{}:{}",
            profile.base_endpoint(),
            profile.model_name(),
            method
        ))
        .map_err(|e| {
            LlmError::InvalidInput(format!(
                "base endpoint for provider {} is not a valid URL: {e}",
                profile.provider_id()
            ))
        })?;
        url.query_pairs_mut().append_pair("key", profile.credential());

        Ok(ProviderRequest {
            url: url.into(),
            headers: json_headers(),
            body: serde_json::to_value(&req)?,
            stream: options.stream,
            framing: LineFraming::PrefixOptional,
        })
    }

    fn extract_text(&self, raw: &serde_json::Value) -> Result<String> {
        let parsed = GeminiResponse::deserialize(raw)
            .map_err(|e| shape_error(AdapterKind::Gemini, format_args!("did not parse: {e}")))?;
        first_part_text(parsed).ok_or_else(|| {
            shape_error(AdapterKind::Gemini, "missing candidates[0].content.parts[0].text")
        })
    }

    fn extract_delta(&self, fragment: &serde_json::Value) -> Option<String> {
        let parsed = GeminiResponse::deserialize(fragment).ok()?;
        first_part_text(parsed).filter(|s| !s.is_empty())
    }
}

fn first_part_text(resp: GeminiResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}
