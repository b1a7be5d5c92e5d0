use crate::adapter::{ProviderAdapter, adapter_for, extract_text};
use crate::error::{LlmError, Result};
use crate::registry::ProviderRegistry;
use crate::transport::{FragmentStream, Transport, TransportResponse};
use crate::types::{ChatMessage, ChatResponse, GenerationOptions, StreamChunk};
use futures_util::Stream;
use futures_util::StreamExt;
use std::pin::Pin;

/// Text deltas of a streamed completion, always ending in [`StreamChunk::Done`]
/// unless an error is yielded first.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

pub enum ChatOutcome {
    Complete(ChatResponse),
    Stream(ChatStream),
}

impl ChatOutcome {
    /// Full text, draining the stream if there is one.
    pub async fn into_text(self) -> Result<String> {
        match self {
            ChatOutcome::Complete(resp) => Ok(resp.text),
            ChatOutcome::Stream(mut stream) => {
                let mut text = String::new();
                while let Some(chunk) = stream.next().await {
                    match chunk? {
                        StreamChunk::Delta { text: delta } => text.push_str(&delta),
                        StreamChunk::Done => break,
                    }
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatOutcome::Complete(resp) => f.debug_tuple("Complete").field(resp).finish(),
            ChatOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Entry point for chat calls. Cheap to copy; holds only a registry reference.
#[derive(Debug, Clone, Copy)]
pub struct LlmClient<'r> {
    registry: &'r ProviderRegistry,
}

impl<'r> LlmClient<'r> {
    pub fn new(registry: &'r ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r ProviderRegistry {
        self.registry
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(
            provider = %provider.unwrap_or(self.registry.default_provider()),
            stream = options.stream,
        )
    )]
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        provider: Option<&str>,
        options: GenerationOptions,
    ) -> Result<ChatOutcome> {
        let profile = self.registry.resolve(provider)?;
        let adapter = adapter_for(profile.adapter());
        let request = adapter.build_request(profile, messages, &options)?;
        tracing::debug!(
            adapter = %profile.adapter(),
            model = profile.model_name(),
            messages = messages.len(),
            "built provider request"
        );

        let transport = Transport::new(profile.timeout())?;
        match transport.send(request).await? {
            TransportResponse::Buffered(raw) => Ok(ChatOutcome::Complete(ChatResponse {
                text: extract_text(profile.adapter(), &raw)?,
            })),
            TransportResponse::Streamed(fragments) => {
                Ok(ChatOutcome::Stream(into_chunks(adapter, fragments)))
            }
        }
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        provider: Option<&str>,
        options: GenerationOptions,
    ) -> Result<ChatResponse> {
        let options = GenerationOptions {
            stream: false,
            ..options
        };
        match self.chat_completion(messages, provider, options).await? {
            ChatOutcome::Complete(resp) => Ok(resp),
            ChatOutcome::Stream(_) => Err(LlmError::ResponseShape(
                "expected a buffered response".to_string(),
            )),
        }
    }

    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        provider: Option<&str>,
        options: GenerationOptions,
    ) -> Result<ChatStream> {
        let options = GenerationOptions {
            stream: true,
            ..options
        };
        match self.chat_completion(messages, provider, options).await? {
            ChatOutcome::Stream(stream) => Ok(stream),
            ChatOutcome::Complete(_) => Err(LlmError::ResponseShape(
                "expected a streamed response".to_string(),
            )),
        }
    }

    /// One user message in, text out.
    pub async fn simple_chat(&self, prompt: &str, provider: Option<&str>) -> Result<String> {
        let messages = [ChatMessage::user(prompt)];
        let resp = self
            .chat(&messages, provider, GenerationOptions::default())
            .await?;
        Ok(resp.text)
    }

    /// A system prompt plus one instruction, text out.
    pub async fn ask(
        &self,
        system_prompt: &str,
        instruction: &str,
        provider: Option<&str>,
    ) -> Result<String> {
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(instruction),
        ];
        let resp = self
            .chat(&messages, provider, GenerationOptions::default())
            .await?;
        Ok(resp.text)
    }
}

impl LlmClient<'static> {
    /// Client over the registry installed with [`ProviderRegistry::install`].
    pub fn global() -> Result<Self> {
        ProviderRegistry::global()
            .map(Self::new)
            .ok_or(LlmError::RegistryUninitialized)
    }
}

/// Chat through the process-wide registry.
pub async fn chat(
    messages: &[ChatMessage],
    provider: Option<&str>,
    options: GenerationOptions,
) -> Result<ChatOutcome> {
    LlmClient::global()?
        .chat_completion(messages, provider, options)
        .await
}

/// Single prompt through the process-wide registry.
pub async fn simple_chat(prompt: &str, provider: Option<&str>) -> Result<String> {
    LlmClient::global()?.simple_chat(prompt, provider).await
}

fn into_chunks(adapter: &'static dyn ProviderAdapter, fragments: FragmentStream) -> ChatStream {
    let stream = futures_util::stream::unfold(
        Some(fragments),
        move |state| async move {
            let mut fragments = state?;
            loop {
                match fragments.next().await {
                    Some(Ok(fragment)) => {
                        if let Some(text) = adapter.extract_delta(&fragment) {
                            return Some((Ok(StreamChunk::Delta { text }), Some(fragments)));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => return Some((Ok(StreamChunk::Done), None)),
                }
            }
        },
    );
    Box::pin(stream)
}
