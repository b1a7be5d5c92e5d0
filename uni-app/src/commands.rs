//! One-shot CLI commands.

use anyhow::Result;
use futures_util::StreamExt;
use std::io::Write;
use uni_llm::{ChatMessage, GenerationOptions, LlmClient, ProviderRegistry, StreamChunk};

pub struct AskArgs<'a> {
    pub prompt: &'a str,
    pub provider: Option<&'a str>,
    pub system: Option<&'a str>,
    pub options: GenerationOptions,
}

pub fn render_status(registry: &ProviderRegistry) -> String {
    let mut out = format!(
        "{:<2}{:<12} {:<8} {:<28} {}\n",
        "", "PROVIDER", "ADAPTER", "MODEL", "STATUS"
    );
    for s in registry.statuses() {
        let marker = if s.is_default { "*" } else { "" };
        let status = if s.configured {
            "configured"
        } else {
            "missing key"
        };
        out.push_str(&format!(
            "{:<2}{:<12} {:<8} {:<28} {}\n",
            marker, s.provider_id, s.adapter, s.model_name, status
        ));
    }
    out
}

pub fn status(registry: &ProviderRegistry, out: &mut impl Write) -> Result<()> {
    out.write_all(render_status(registry).as_bytes())?;
    Ok(())
}

fn messages_for(args: &AskArgs<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = args.system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.prompt));
    messages
}

#[tracing::instrument(level = "info", skip_all, fields(stream = args.options.stream))]
pub async fn ask(client: &LlmClient<'_>, args: AskArgs<'_>, out: &mut impl Write) -> Result<()> {
    let messages = messages_for(&args);
    if !args.options.stream {
        let resp = client.chat(&messages, args.provider, args.options).await?;
        writeln!(out, "{}", resp.text)?;
        return Ok(());
    }

    let mut stream = client
        .chat_stream(&messages, args.provider, args.options)
        .await?;
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Delta { text } => {
                out.write_all(text.as_bytes())?;
                out.flush()?;
            }
            StreamChunk::Done => break,
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Sends the same prompt to every configured provider, one after another.
pub async fn compare(client: &LlmClient<'_>, prompt: &str, out: &mut impl Write) -> Result<()> {
    let configured: Vec<String> = client
        .registry()
        .statuses()
        .into_iter()
        .filter(|s| s.configured)
        .map(|s| s.provider_id)
        .collect();

    if configured.is_empty() {
        writeln!(out, "no provider has an API key configured")?;
        return Ok(());
    }

    for id in configured {
        writeln!(out, "== {id}")?;
        match client.simple_chat(prompt, Some(&id)).await {
            Ok(text) => writeln!(out, "{text}")?,
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "provider call failed");
                writeln!(out, "error: {e}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uni_llm::{AdapterKind, ConnectionProfile};

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new("gemini")
            .with_profile(
                ConnectionProfile::new("gemini", AdapterKind::Gemini, "http://g", "gemini-1.5-flash")
                    .with_credential("k"),
            )
            .with_profile(ConnectionProfile::new(
                "openai",
                AdapterKind::OpenAi,
                "http://o",
                "gpt-3.5-turbo",
            ))
    }

    #[test]
    fn status_marks_default_and_missing_keys() {
        let rendered = render_status(&registry());
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PROVIDER"));
        assert!(lines[1].starts_with("* gemini"));
        assert!(lines[1].ends_with("configured"));
        assert!(lines[2].starts_with("  openai"));
        assert!(lines[2].ends_with("missing key"));
    }

    #[test]
    fn system_prompt_goes_first_when_present() {
        let args = AskArgs {
            prompt: "q",
            provider: None,
            system: Some("s"),
            options: GenerationOptions::default(),
        };
        assert_eq!(
            messages_for(&args),
            vec![ChatMessage::system("s"), ChatMessage::user("q")]
        );

        let args = AskArgs {
            system: Some(""),
            ..args
        };
        assert_eq!(messages_for(&args), vec![ChatMessage::user("q")]);
    }

    #[tokio::test]
    async fn compare_with_nothing_configured_says_so() {
        let registry = ProviderRegistry::new("openai").with_profile(ConnectionProfile::new(
            "openai",
            AdapterKind::OpenAi,
            "http://o",
            "m",
        ));
        let client = LlmClient::new(&registry);
        let mut out = Vec::new();
        compare(&client, "hi", &mut out).await.expect("compare runs");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "no provider has an API key configured\n"
        );
    }

    #[tokio::test]
    async fn ask_surfaces_missing_credential() {
        let registry = registry();
        let client = LlmClient::new(&registry);
        let mut out = Vec::new();
        let err = ask(
            &client,
            AskArgs {
                prompt: "hi",
                provider: Some("openai"),
                system: None,
                options: GenerationOptions::default(),
            },
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no credential"));
        assert!(out.is_empty());
    }
}
