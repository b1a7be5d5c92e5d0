use crate::adapter::ProviderRequest;
use crate::error::{LlmError, Result};
use bytes::Bytes;
use futures_util::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::time::Duration;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Parsed JSON fragments of a streamed response, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

/// How a streamed body is split into JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFraming {
    /// Only `data: ` lines carry payloads; `data: [DONE]` ends the stream.
    DataPrefixed,
    /// Every non-blank line is a payload, `data: ` prefix optional. Ends on close.
    PrefixOptional,
}

pub enum TransportResponse {
    Buffered(serde_json::Value),
    Streamed(FragmentStream),
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportResponse::Buffered(v) => f.debug_tuple("Buffered").field(v).finish(),
            TransportResponse::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// One HTTP client per call; nothing is shared between calls.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
}

impl Transport {
    /// `timeout` bounds connecting and each individual read, not the whole stream.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(url = %request.redacted_url(), stream = request.stream)
    )]
    pub async fn send(&self, request: ProviderRequest) -> Result<TransportResponse> {
        let ProviderRequest {
            url,
            headers,
            body,
            stream,
            framing,
        } = request;

        tracing::debug!("dispatching provider request");
        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "provider returned error status");
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        if !stream {
            let body = response.text().await?;
            let value: serde_json::Value = serde_json::from_str(&body)?;
            return Ok(TransportResponse::Buffered(value));
        }

        Ok(TransportResponse::Streamed(decode_fragments(
            Box::pin(response.bytes_stream()),
            framing,
        )))
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum LineOutcome {
    Fragment(serde_json::Value),
    Skip,
    Done,
}

pub(crate) fn parse_line(line: &str, framing: LineFraming) -> LineOutcome {
    let line = line.trim_end_matches('\r');
    let payload = match framing {
        LineFraming::DataPrefixed => {
            let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
                return LineOutcome::Skip;
            };
            if rest.trim() == DONE_SENTINEL {
                return LineOutcome::Done;
            }
            rest
        }
        LineFraming::PrefixOptional => {
            if line.trim().is_empty() {
                return LineOutcome::Skip;
            }
            line.strip_prefix(DATA_PREFIX).unwrap_or(line)
        }
    };

    match serde_json::from_str(payload) {
        Ok(v) => LineOutcome::Fragment(v),
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable stream line");
            LineOutcome::Skip
        }
    }
}

/// Splits a byte stream into lines without decoding partial UTF-8 sequences.
fn decode_lines<S>(bytes_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures_util::stream::unfold(
        (bytes_stream, Vec::<u8>::new(), false),
        |(mut stream, mut buffer, mut eof)| async move {
            loop {
                if let Some(idx) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=idx).collect();
                    let line = String::from_utf8_lossy(&raw[..idx]).into_owned();
                    return Some((Ok(line), (stream, buffer, eof)));
                }
                if eof {
                    if buffer.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    buffer.clear();
                    return Some((Ok(line), (stream, buffer, eof)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        // Nothing after a broken read is trustworthy.
                        buffer.clear();
                        eof = true;
                        return Some((Err(LlmError::from(e)), (stream, buffer, eof)));
                    }
                    None => eof = true,
                }
            }
        },
    )
}

pub(crate) fn decode_fragments<S>(bytes_stream: S, framing: LineFraming) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let lines = Box::pin(decode_lines(bytes_stream));
    let stream = futures_util::stream::unfold(lines, move |mut lines| async move {
        loop {
            let line = match lines.as_mut().next().await? {
                Ok(line) => line,
                Err(e) => return Some((Err(e), lines)),
            };
            match parse_line(&line, framing) {
                LineOutcome::Fragment(v) => return Some((Ok(v), lines)),
                LineOutcome::Skip => continue,
                LineOutcome::Done => return None,
            }
        }
    });
    Box::pin(stream)
}
