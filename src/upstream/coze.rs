// ABOUTME: Coze agent API client over reqwest implementing the UpstreamApi trait
// ABOUTME: Handles token injection, response envelopes, SSE streams, chat polling, and spooled uploads
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::credentials::CredentialCache;
use super::events::{
    normalize_chat_frame, normalize_workflow_frame, normalized_events, EventSource, Normalized,
    Usage, WireChat, WireMessage,
};
use super::sse_parser::{frame_stream, SseFrame};
use super::{
    AssistantReply, ChatStreamRequest, HistoryMessage, UploadSource, UploadedFile, UpstreamApi,
    WorkflowInput, WorkflowRunResult,
};
use crate::config::environment::CozeConfig;
use crate::constants::upstream::{
    chat_status, paths, CHAT_POLL_INTERVAL_MS, LOG_ID_HEADER, SERVICE_NAME,
};
use crate::errors::{AppError, AppResult};
use crate::models::MessageRole;

/// Standard upstream response envelope `{code, msg, data}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, what: &str) -> AppResult<T> {
        if self.code != 0 {
            return Err(AppError::external_service(
                SERVICE_NAME,
                format!("{what} failed ({}): {}", self.code, self.msg),
            ));
        }
        self.data
            .ok_or_else(|| AppError::upstream_protocol(format!("{what}: response has no data")))
    }
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    role: &'a str,
    content: &'a str,
    content_type: &'static str,
    #[serde(rename = "type")]
    message_type: &'static str,
}

impl<'a> OutgoingMessage<'a> {
    fn user(content: &'a str) -> Self {
        Self {
            role: MessageRole::User.as_str(),
            content,
            content_type: "text",
            message_type: "question",
        }
    }

    /// Upstream only accepts user and assistant turns as additional messages
    fn from_history(message: &'a HistoryMessage) -> Option<Self> {
        match message.role {
            MessageRole::User => Some(Self::user(&message.content)),
            MessageRole::Assistant => Some(Self {
                role: MessageRole::Assistant.as_str(),
                content: &message.content,
                content_type: "text",
                message_type: "answer",
            }),
            MessageRole::System => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    bot_id: &'a str,
    user_id: &'a str,
    stream: bool,
    auto_save_history: bool,
    additional_messages: Vec<OutgoingMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WorkflowBody<'a> {
    workflow_id: &'a str,
    parameters: &'a serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedConversation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    id: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    file_name: String,
}

/// Non-streaming workflow responses put a JSON-encoded string in `data`
#[derive(Debug, Deserialize)]
struct WorkflowRunResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<String>,
    debug_url: Option<String>,
    usage: Option<Usage>,
}

/// Coze API client
pub struct CozeClient {
    http: reqwest::Client,
    config: CozeConfig,
    credentials: Arc<CredentialCache>,
}

impl CozeClient {
    /// Create a client sharing `http` and the process-wide credential cache
    #[must_use]
    pub fn new(http: reqwest::Client, config: CozeConfig, credentials: Arc<CredentialCache>) -> Self {
        Self {
            http,
            config,
            credentials,
        }
    }

    /// Build the shared HTTP client with the upstream call ceiling
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized
    pub fn http_client(config: &CozeConfig) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    fn bot_id(&self) -> AppResult<&str> {
        if self.config.bot_id.is_empty() {
            return Err(AppError::config("COZE_BOT_ID is not configured"));
        }
        Ok(&self.config.bot_id)
    }

    fn workflow_id(&self) -> AppResult<&str> {
        if self.config.workflow_id.is_empty() {
            return Err(AppError::config("COZE_WORKFLOW_ID is not configured"));
        }
        Ok(&self.config.workflow_id)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> AppResult<Response> {
        let token = self.credentials.ensure_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Token revoked or rotated upstream; the next call re-issues
            if let Err(e) = self.credentials.invalidate().await {
                warn!("Failed to invalidate rejected access token: {e}");
            }
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{what} failed with {status}: {body}");
        Err(if status.is_server_error() {
            AppError::upstream_unavailable(message)
        } else {
            AppError::external_service(SERVICE_NAME, message)
        })
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> AppResult<T> {
        let response = self.send(request, what).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| AppError::upstream_protocol(format!("{what}: undecodable response: {e}")))?;
        envelope.into_data(what)
    }

    async fn open_stream(
        &self,
        request: RequestBuilder,
        what: &str,
        normalize: fn(&SseFrame) -> Normalized,
    ) -> AppResult<EventSource> {
        let response = self
            .send(request.header(ACCEPT, "text/event-stream"), what)
            .await?;

        let log_id = response
            .headers()
            .get(LOG_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            // Refusals arrive as a plain envelope with a 200 status
            let envelope: Envelope<Value> = response.json().await?;
            envelope.into_data(what)?;
            return Err(AppError::upstream_protocol(format!(
                "{what}: expected an event stream"
            )));
        }

        debug!(log_id = ?log_id, "{what} stream opened");
        let frames = frame_stream(response.bytes_stream());
        Ok(EventSource::new(log_id, normalized_events(frames, normalize)))
    }

    async fn retrieve_chat(&self, conversation_id: &str, chat_id: &str) -> AppResult<WireChat> {
        let request = self
            .http
            .get(self.url(paths::CHAT_RETRIEVE))
            .query(&[("conversation_id", conversation_id), ("chat_id", chat_id)]);
        self.call(request, "chat retrieve").await
    }

    async fn wait_for_chat(&self, conversation_id: &str, mut chat: WireChat) -> AppResult<WireChat> {
        let interval = Duration::from_millis(CHAT_POLL_INTERVAL_MS);
        while !matches!(
            chat.status.as_str(),
            chat_status::COMPLETED
                | chat_status::FAILED
                | chat_status::REQUIRES_ACTION
                | chat_status::CANCELED
        ) {
            tokio::time::sleep(interval).await;
            chat = self.retrieve_chat(conversation_id, &chat.id).await?;
        }
        Ok(chat)
    }

    /// Copy the upload into an anonymous temporary file so it has a known length
    ///
    /// The file has no name on disk and is removed when the handle drops.
    async fn spool(source: UploadSource) -> AppResult<(tokio::fs::File, u64)> {
        let std_file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(|e| AppError::internal(format!("Temp file task failed: {e}")))??;
        let mut file = tokio::fs::File::from_std(std_file);
        let mut reader = source.reader;

        let size = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok((file, size))
    }
}

#[async_trait]
impl UpstreamApi for CozeClient {
    async fn create_conversation(&self) -> AppResult<String> {
        let request = self
            .http
            .post(self.url(paths::CONVERSATION_CREATE))
            .json(&serde_json::json!({ "bot_id": self.bot_id()? }));
        let created: CreatedConversation = self.call(request, "conversation create").await?;
        info!(external_conversation_id = %created.id, "Created upstream conversation");
        Ok(created.id)
    }

    async fn send_message(
        &self,
        external_conversation_id: &str,
        user_id: &str,
        text: &str,
    ) -> AppResult<AssistantReply> {
        let body = ChatBody {
            bot_id: self.bot_id()?,
            user_id,
            stream: false,
            auto_save_history: true,
            additional_messages: vec![OutgoingMessage::user(text)],
        };
        let request = self
            .http
            .post(self.url(paths::CHAT))
            .query(&[("conversation_id", external_conversation_id)])
            .json(&body);
        let started: WireChat = self.call(request, "chat").await?;

        let chat = tokio::time::timeout(
            self.config.request_timeout,
            self.wait_for_chat(external_conversation_id, started),
        )
        .await
        .map_err(|_| AppError::upstream_unavailable("Timed out waiting for chat completion"))??;

        match chat.status.as_str() {
            chat_status::COMPLETED => {
                let request = self
                    .http
                    .get(self.url(paths::CHAT_MESSAGE_LIST))
                    .query(&[
                        ("conversation_id", external_conversation_id),
                        ("chat_id", chat.id.as_str()),
                    ]);
                let messages: Vec<WireMessage> = self.call(request, "chat message list").await?;
                let content: String = messages
                    .iter()
                    .filter(|m| m.message_type == "answer")
                    .map(|m| m.content.as_str())
                    .collect();
                Ok(AssistantReply {
                    chat_id: chat.id,
                    content,
                    usage: chat.usage.unwrap_or_default(),
                })
            }
            chat_status::FAILED => {
                let err = chat.last_error.unwrap_or_default();
                Err(AppError::external_service(
                    SERVICE_NAME,
                    format!("chat failed ({}): {}", err.code, err.msg),
                ))
            }
            other => Err(AppError::external_service(
                SERVICE_NAME,
                format!("chat ended with status {other}"),
            )),
        }
    }

    async fn open_chat_stream(&self, request: ChatStreamRequest) -> AppResult<EventSource> {
        let additional_messages = request
            .history
            .iter()
            .filter_map(OutgoingMessage::from_history)
            .chain(std::iter::once(OutgoingMessage::user(&request.text)))
            .collect();
        // The local store owns streamed history, so the upstream call is
        // stateless: no conversation binding and nothing saved on the Coze side.
        let body = ChatBody {
            bot_id: self.bot_id()?,
            user_id: &request.user_id,
            stream: true,
            auto_save_history: false,
            additional_messages,
        };
        debug!(
            external_conversation_id = %request.external_conversation_id,
            history = request.history.len(),
            "Opening chat stream"
        );
        let http_request = self.http.post(self.url(paths::CHAT)).json(&body);
        self.open_stream(http_request, "chat stream", normalize_chat_frame)
            .await
    }

    async fn open_workflow_stream(&self, input: WorkflowInput) -> AppResult<EventSource> {
        let request = self
            .http
            .post(self.url(paths::WORKFLOW_STREAM_RUN))
            .json(&WorkflowBody {
                workflow_id: self.workflow_id()?,
                parameters: &input.parameters,
            });
        self.open_stream(request, "workflow stream", normalize_workflow_frame)
            .await
    }

    async fn run_workflow(&self, input: WorkflowInput) -> AppResult<WorkflowRunResult> {
        let request = self
            .http
            .post(self.url(paths::WORKFLOW_RUN))
            .json(&WorkflowBody {
                workflow_id: self.workflow_id()?,
                parameters: &input.parameters,
            });
        let response: WorkflowRunResponse = self
            .send(request, "workflow run")
            .await?
            .json()
            .await
            .map_err(|e| AppError::upstream_protocol(format!("workflow run: {e}")))?;

        if response.code != 0 {
            return Err(AppError::external_service(
                SERVICE_NAME,
                format!("workflow run failed ({}): {}", response.code, response.msg),
            ));
        }
        let data = response.data.map_or(Value::Null, |raw| {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        });
        Ok(WorkflowRunResult {
            data,
            debug_url: response.debug_url,
            usage: response.usage,
        })
    }

    async fn upload(&self, source: UploadSource) -> AppResult<UploadedFile> {
        let file_name = source.file_name.clone();
        let (file, size) = Self::spool(source).await?;

        let part = Part::stream_with_length(Body::from(file), size).file_name(file_name.clone());
        let request = self
            .http
            .post(self.url(paths::FILE_UPLOAD))
            .multipart(Form::new().part("file", part));
        let uploaded: WireFile = self.call(request, "file upload").await?;

        info!(file_id = %uploaded.id, size, "Uploaded file upstream");
        Ok(UploadedFile {
            file_id: uploaded.id,
            filename: if uploaded.file_name.is_empty() {
                file_name
            } else {
                uploaded.file_name
            },
            size: if uploaded.bytes == 0 { size } else { uploaded.bytes },
        })
    }
}
