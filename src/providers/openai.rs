use std::collections::VecDeque;

use anyhow::{Context, anyhow};
use eventsource_stream::EventStreamError;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{CatalogFuture, ModelCatalog, ModelInfo};
use crate::completion::{CompletionClient, CompletionFuture, FragmentFuture, FragmentStream, StreamEvent};
use crate::config::Config;
use crate::error::{CatalogError, CompletionError};
use crate::model::Message;
use crate::providers::http_errors::api_request_error;
use crate::providers::sse::{self, SseEvents};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    created: i64,
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn models_url(base_url: &str) -> String {
    format!("{}/models", base_url.trim_end_matches('/'))
}

fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        })
        .collect()
}

/// Client for OpenAI-compatible `/models` and streamed `/chat/completions`.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.api_base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout_secs: cfg.model_timeout_secs,
        }
    }

    async fn fetch_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let api_url = models_url(&self.base_url);
        debug!(api_url = %api_url, "listing models");

        let response = self
            .client
            .get(&api_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %api_url, error = %err, "model listing request failed");
                api_request_error(err, &api_url, self.timeout_secs)
            })?;

        let response = ensure_success(response, &api_url).await?;
        let parsed: ModelListResponse = response
            .json()
            .await
            .context("Failed to parse model list response")?;
        debug!(model_count = parsed.data.len(), "received model list");

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| ModelInfo::new(entry.id, entry.created))
            .collect())
    }

    async fn start_stream(
        &self,
        messages: &[Message],
        model: &str,
    ) -> anyhow::Result<OpenAiFragmentStream> {
        let api_url = chat_completions_url(&self.base_url);
        let body = ChatCompletionRequest {
            model,
            stream: true,
            messages: to_chat_messages(messages),
        };
        debug!(
            api_url = %api_url,
            model = %model,
            message_count = messages.len(),
            "sending streamed chat request"
        );

        let response = self
            .client
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %api_url, model = %model, error = %err, "chat request failed");
                api_request_error(err, &api_url, self.timeout_secs)
            })?;

        let response = ensure_success(response, &api_url).await?;
        Ok(OpenAiFragmentStream::new(response, api_url, self.timeout_secs))
    }
}

async fn ensure_success(response: Response, api_url: &str) -> anyhow::Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let response_body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        api_url = %api_url,
        status = %status,
        response_body_len = response_body.len(),
        "API returned non-success status"
    );
    Err(anyhow!(
        "Request failed with status {}: {}",
        status,
        response_body
    ))
}

impl ModelCatalog for OpenAiClient {
    fn list_models<'a>(&'a self) -> CatalogFuture<'a> {
        Box::pin(async move {
            self.fetch_models()
                .await
                .map_err(|err| CatalogError::new(format!("{err:#}")))
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn send<'a>(&'a self, messages: &'a [Message], model: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let stream = self.start_stream(messages, model).await?;
            Ok(Box::new(stream) as Box<dyn FragmentStream>)
        })
    }
}

/// Server-sent-event body of one streamed chat completion.
pub struct OpenAiFragmentStream {
    events: SseEvents<reqwest::Error>,
    api_url: String,
    timeout_secs: u64,
    pending: VecDeque<String>,
    saw_finish_reason: bool,
    finished: bool,
}

impl OpenAiFragmentStream {
    fn new(response: Response, api_url: String, timeout_secs: u64) -> Self {
        Self {
            events: sse::events(response.bytes_stream()),
            api_url,
            timeout_secs,
            pending: VecDeque::new(),
            saw_finish_reason: false,
            finished: false,
        }
    }

    fn handle_payload(&mut self, payload: &str) -> Result<(), CompletionError> {
        if self.finished {
            return Ok(());
        }

        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(());
        }
        if payload == DONE_MARKER {
            self.finished = true;
            return Ok(());
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(payload)
            .context("Failed to parse streamed chat chunk")
            .map_err(CompletionError::from)?;
        if let Some(error) = chunk.error {
            return Err(CompletionError::new(format!(
                "API reported an error mid-stream: {}",
                error.message
            )));
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.and_then(|delta| delta.content)
                && !content.is_empty()
            {
                self.pending.push_back(content);
            }
            if choice.finish_reason.is_some() {
                self.saw_finish_reason = true;
            }
        }
        Ok(())
    }

    async fn next(&mut self) -> Result<StreamEvent, CompletionError> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Ok(StreamEvent::Fragment(fragment));
            }
            if self.finished {
                return Ok(StreamEvent::Done);
            }

            match self.events.next().await {
                Some(Ok(event)) => self.handle_payload(&event.data)?,
                Some(Err(EventStreamError::Transport(err))) => {
                    warn!(api_url = %self.api_url, error = %err, "chat stream read failed");
                    return Err(CompletionError::from(api_request_error(
                        err,
                        &self.api_url,
                        self.timeout_secs,
                    )));
                }
                Some(Err(err)) => {
                    warn!(api_url = %self.api_url, error = %err, "chat stream was not valid SSE");
                    return Err(CompletionError::new(format!(
                        "Failed to decode chat stream: {err}"
                    )));
                }
                None => {
                    if !self.finished {
                        if !self.saw_finish_reason {
                            warn!(api_url = %self.api_url, "chat stream closed before completion");
                            return Err(CompletionError::new(
                                "stream ended before the model finished its reply",
                            ));
                        }
                        self.finished = true;
                    }
                }
            }
        }
    }
}

impl FragmentStream for OpenAiFragmentStream {
    fn next_event<'a>(&'a mut self) -> FragmentFuture<'a> {
        Box::pin(self.next())
    }
}
