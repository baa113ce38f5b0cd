//! Answer generation against an OpenAI-compatible chat completions API.
//!
//! [`OpenAiGenerator`] posts the composed prompt to `{url}/chat/completions`
//! and either returns the whole answer or streams it. Streaming uses
//! server-sent events: every `data:` line carries a JSON delta and the
//! literal `data: [DONE]` ends the answer. Network chunks do not respect
//! line boundaries, so [`SseDecoder`] buffers partial lines between them.
//!
//! The returned [`TextStream`] owns the HTTP response body. Dropping it
//! closes the connection, which is how an abandoned client cancels
//! generation upstream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rag_harness_core::generation::{Generator, TextStream};
use rag_harness_core::models::ChatMessage;

use crate::config::LlmConfig;

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl OpenAiGenerator {
    /// Build from `[llm]`, reading the key from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() {
            warn!("OPENAI_API_KEY not set; requests to {} will be unauthenticated", config.url);
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.timeout_secs.max(1));

        // No whole-request timeout on the client: it would also cut off
        // long streamed bodies, which the idle timeout bounds instead.
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout,
            stream_idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs.max(1)),
        })
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let payload = tokio::time::timeout(self.request_timeout, async {
            let response = self
                .request(messages, false)
                .send()
                .await
                .context("chat completion request failed")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("chat completion error {}: {}", status, body);
            }

            response
                .json::<Value>()
                .await
                .context("invalid chat completion response")
        })
        .await
        .with_context(|| {
            format!(
                "chat completion timed out after {}s",
                self.request_timeout.as_secs()
            )
        })??;

        let answer = parse_completion(&payload)?;

        if let Some(usage) = payload.get("usage") {
            info!(
                prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0),
                completion_tokens = usage["completion_tokens"].as_u64().unwrap_or(0),
                total_tokens = usage["total_tokens"].as_u64().unwrap_or(0),
                "response generated"
            );
        }

        Ok(answer)
    }

    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = tokio::time::timeout(
            self.request_timeout,
            self.request(messages, true).send(),
        )
        .await
        .context("chat completion stream did not start in time")?
        .context("chat completion stream request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion stream error {}: {}", status, body);
        }

        Ok(sse_text_stream(
            Box::pin(response.bytes_stream()),
            self.stream_idle_timeout,
        ))
    }
}

/// Generator used when `[llm] provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("answer generation is disabled; set [llm] provider in the config")
    }

    async fn generate_stream(&self, _messages: &[ChatMessage]) -> Result<TextStream> {
        bail!("answer generation is disabled; set [llm] provider in the config")
    }
}

pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn parse_completion(payload: &Value) -> Result<String> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("chat completion response has no message content"))
}

// ============ Server-sent events ============

/// One decoded SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Delta(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Incremental decoder for `text/event-stream` bodies of chat completions.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the events completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the body ends without a final newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_sse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<Value>(data) {
        Ok(json) => json["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|content| !content.is_empty())
            .map(|content| SseEvent::Delta(content.to_string())),
        Err(e) => {
            debug!(error = %e, "skipping unparseable stream line");
            None
        }
    }
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
    idle_timeout: Duration,
}

/// Turn an SSE byte stream into answer fragments.
///
/// Ends at `[DONE]` or end of body. A transport error, or no bytes for
/// `idle_timeout`, yields one `Err` and ends the stream.
pub fn sse_text_stream<S, B, E>(body: S, idle_timeout: Duration) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        idle_timeout,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
                Err(_) => {
                    state.finished = true;
                    let err = anyhow::anyhow!(
                        "generation stalled: no data for {}s",
                        state.idle_timeout.as_secs_f32()
                    );
                    return Some((Err(err), state));
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    let err = anyhow::Error::new(e).context("generation stream interrupted");
                    return Some((Err(err), state));
                }
                Ok(Some(Ok(bytes))) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.absorb(events);
                }
                Ok(None) => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

impl<S> SseState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}
