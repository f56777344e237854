//! Authenticated client for the Claude web session API.
//!
//! [`WebSession`] speaks to the same endpoints as the browser client: it
//! resolves the organization once, creates a conversation per request,
//! streams the completion back and cleans the conversation up afterwards.

pub mod payload;

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::config::UpstreamConfig;
use crate::error::{sanitize_upstream_error, CanonicalError};
use crate::observability::mask_secret;

pub use payload::{big_context_attachment, Attachment, DataUri};
use payload::{
    account_settings_body, select_organization, CompletionBody, CreateConversationBody,
    CreatedConversation, Organization, UploadedFile,
};

/// Model-name suffix requesting extended reasoning.
pub const THINK_SUFFIX: &str = "-think";

const EVENT_STREAM_ACCEPT: &str = "text/event-stream, text/event-stream";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const CLIENT_PLATFORM: &str = "web_claude_ai";

/// A requested model split into the upstream name and the reasoning flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub name: String,
    pub extended_thinking: bool,
}

impl ResolvedModel {
    #[must_use]
    pub fn resolve(requested: &str) -> Self {
        match requested.strip_suffix(THINK_SUFFIX) {
            Some(base) => Self {
                name: base.to_string(),
                extended_thinking: true,
            },
            None => Self {
                name: requested.to_string(),
                extended_thinking: false,
            },
        }
    }
}

/// Everything one completion call sends besides the conversation id.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub files: Vec<String>,
}

pub struct WebSession {
    http: reqwest::Client,
    config: UpstreamConfig,
    base_url: String,
    cookie: HeaderValue,
    organization: RwLock<Option<Arc<str>>>,
}

impl WebSession {
    /// # Errors
    ///
    /// Returns [`CanonicalError::Config`] when the session key cannot be sent
    /// as a header value.
    pub fn new(http: reqwest::Client, config: UpstreamConfig) -> Result<Self, CanonicalError> {
        let cookie = HeaderValue::from_str(&format!("sessionKey={}", config.session_key))
            .map_err(|_| {
                CanonicalError::Config("session_key contains invalid header characters".into())
            })?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        tracing::info!(
            base_url = %base_url,
            session_key = %mask_secret(&config.session_key),
            proxy = config.proxy.as_deref().unwrap_or("none"),
            "web session configured"
        );
        Ok(Self {
            http,
            config,
            base_url,
            cookie,
            organization: RwLock::new(None),
        })
    }

    fn is_unversioned(&self, model: &str) -> bool {
        self.config.unversioned_models.iter().any(|m| m == model)
    }

    fn request(&self, method: Method, path: &str, referer_path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(ACCEPT, EVENT_STREAM_ACCEPT)
            .header("accept-language", ACCEPT_LANGUAGE)
            .header("anthropic-client-platform", CLIENT_PLATFORM)
            .header(ORIGIN, &self.base_url)
            .header("priority", "u=1, i")
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(REFERER, format!("{}{referer_path}", self.base_url))
            .header(COOKIE, self.cookie.clone())
    }

    fn json_request<T: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        referer_path: &str,
        body: &T,
    ) -> Result<RequestBuilder, CanonicalError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|err| CanonicalError::Internal(format!("failed to encode body: {err}")))?;
        Ok(self
            .request(method, path, referer_path)
            .header(CONTENT_TYPE, "application/json")
            .body(bytes))
    }

    /// Map a non-accepted status to [`CanonicalError::Upstream`], dropping the
    /// cached organization when the credentials were rejected.
    async fn check_status(
        &self,
        response: Response,
        accepted: &[StatusCode],
        operation: &'static str,
    ) -> Result<Response, CanonicalError> {
        let status = response.status();
        if accepted.contains(&status) {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        let mut message = sanitize_upstream_error(&body);
        if message.is_empty() {
            message = format!("unexpected status code: {}", status.as_u16());
        }
        tracing::warn!(operation, status = status.as_u16(), %message, "upstream call rejected");
        let err = CanonicalError::Upstream {
            status: status.as_u16(),
            message,
        };
        if err.is_auth_rejection() {
            self.organization.write().take();
        }
        Err(err)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: Response,
        operation: &'static str,
    ) -> Result<T, CanonicalError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            CanonicalError::Translation(format!("{operation}: failed to parse response: {err}"))
        })
    }

    /// Organization uuid owning the conversations, fetched once and cached.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Upstream`] on a non-200 answer or when no
    /// usable organization exists, [`CanonicalError::Transport`] on I/O
    /// failure.
    pub async fn organization_id(&self) -> Result<Arc<str>, CanonicalError> {
        let cached = self.organization.read().clone();
        if let Some(org) = cached {
            return Ok(org);
        }
        let response = self
            .request(Method::GET, "/api/organizations", "/new")
            .send()
            .await?;
        let response = self
            .check_status(response, &[StatusCode::OK], "organizations")
            .await?;
        let orgs: Vec<Organization> = Self::read_json(response, "organizations").await?;
        let org = select_organization(&orgs)?;
        tracing::info!(organization = %org.uuid, name = %org.name, "organization resolved");

        let id: Arc<str> = Arc::from(org.uuid.as_str());
        *self.organization.write() = Some(Arc::clone(&id));
        Ok(id)
    }

    /// Create a fresh conversation for `model`, switching the account's
    /// reasoning mode to match it first.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Upstream`] unless the upstream answers 201
    /// with a conversation uuid.
    pub async fn create_conversation(&self, model: &ResolvedModel) -> Result<String, CanonicalError> {
        let org = self.organization_id().await?;
        let paprika = if model.extended_thinking {
            serde_json::Value::from("extended")
        } else {
            serde_json::Value::Null
        };
        if let Err(err) = self.update_user_setting("paprika_mode", paprika).await {
            tracing::warn!(error = %err, "failed to update paprika_mode");
        }

        let model_field = (!self.is_unversioned(&model.name)).then_some(model.name.as_str());
        let body = CreateConversationBody::new(model_field, new_conversation_uuid());
        let response = self
            .json_request(
                Method::POST,
                &format!("/api/organizations/{org}/chat_conversations"),
                "/new",
                &body,
            )?
            .send()
            .await?;
        let response = self
            .check_status(response, &[StatusCode::CREATED], "create_conversation")
            .await?;
        let created: CreatedConversation = Self::read_json(response, "create_conversation").await?;
        tracing::debug!(conversation = %created.uuid, model = %model.name, "conversation created");
        Ok(created.uuid)
    }

    /// Submit the prompt and return the still-open event stream response.
    ///
    /// # Errors
    ///
    /// A 429 maps to a rate-limit [`CanonicalError::Upstream`]; any other
    /// non-200 status to a plain upstream error.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        model: &ResolvedModel,
        message: &OutgoingMessage,
    ) -> Result<Response, CanonicalError> {
        let org = self.organization_id().await?;
        let model_field = (!self.is_unversioned(&model.name)).then_some(model.name.as_str());
        let body = CompletionBody::new(
            &message.prompt,
            model_field,
            &message.attachments,
            &message.files,
            &self.config.timezone,
        );
        let response = self
            .json_request(
                Method::POST,
                &format!("/api/organizations/{org}/chat_conversations/{conversation_id}/completion"),
                &format!("/chat/{conversation_id}"),
                &body,
            )?
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(conversation = conversation_id, "upstream rate limit hit");
            return Err(CanonicalError::Upstream {
                status: 429,
                message: "rate limit exceeded".to_string(),
            });
        }
        self.check_status(response, &[StatusCode::OK], "send_message")
            .await
    }

    /// # Errors
    ///
    /// Returns [`CanonicalError::Upstream`] unless the upstream answers 200
    /// or 204.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), CanonicalError> {
        let org = self.organization_id().await?;
        let response = self
            .json_request(
                Method::DELETE,
                &format!("/api/organizations/{org}/chat_conversations/{conversation_id}"),
                &format!("/chat/{conversation_id}"),
                &serde_json::json!({ "uuid": conversation_id }),
            )?
            .send()
            .await?;
        self.check_status(
            response,
            &[StatusCode::OK, StatusCode::NO_CONTENT],
            "delete_conversation",
        )
        .await?;
        tracing::debug!(conversation = conversation_id, "conversation deleted");
        Ok(())
    }

    /// Upload a base64 data URI and return the upstream file uuid.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::InvalidRequest`] for a malformed data URI and
    /// [`CanonicalError::Upstream`] when the upload is rejected or the answer
    /// carries no file uuid.
    pub async fn upload_file(&self, data_uri: &str) -> Result<String, CanonicalError> {
        let data = DataUri::parse(data_uri)?;
        let org = self.organization_id().await?;
        let file_name = data.file_name();
        let size = data.bytes.len();
        let part = reqwest::multipart::Part::bytes(data.bytes)
            .file_name(file_name)
            .mime_str(&data.content_type)
            .map_err(|err| CanonicalError::InvalidRequest(format!("invalid content type: {err}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .request(Method::POST, &format!("/api/{org}/upload"), "/new")
            .multipart(form)
            .send()
            .await?;
        let response = self
            .check_status(response, &[StatusCode::OK], "upload_file")
            .await?;
        let uploaded: UploadedFile = Self::read_json(response, "upload_file").await?;
        if uploaded.file_uuid.is_empty() {
            return Err(CanonicalError::Upstream {
                status: 502,
                message: "file UUID not found in response".to_string(),
            });
        }
        tracing::debug!(file = %uploaded.file_uuid, file_name, size, "file uploaded");
        Ok(uploaded.file_uuid)
    }

    /// Update one account setting while sending every other one at its
    /// default.
    ///
    /// # Errors
    ///
    /// Unknown keys are rejected before any request is made; otherwise the
    /// upstream must answer 200 or 202.
    pub async fn update_user_setting(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), CanonicalError> {
        let body = account_settings_body(key, value)?;
        let response = self
            .json_request(
                Method::PUT,
                "/api/account?statsig_hashing_algorithm=djb2",
                "/new",
                &body,
            )?
            .header(CACHE_CONTROL, "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await?;
        self.check_status(
            response,
            &[StatusCode::OK, StatusCode::ACCEPTED],
            "update_user_setting",
        )
        .await?;
        tracing::debug!(key, "account setting updated");
        Ok(())
    }
}

fn new_conversation_uuid() -> String {
    let mut bytes = [0u8; 16];
    fastrand::fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}
