use async_trait::async_trait;
use nlsql_core::backend::LanguageBackend;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::{GptError, Result};

pub const OPENAI_API_ROOT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Serialize, Default, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    pub id: Option<String>,
    pub object: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub created: i64,
}

impl CompletionResponse {
    /// Content of the first choice.
    pub fn into_content(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(GptError::NoChoices)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub message: Message,
    pub index: usize,
    pub finish_reason: Option<String>,
    // Note logprobs omitted.
}

/// Client for an OpenAI compatible chat completions endpoint.
///
/// Completions are requested with temperature 0 so that the same prompt tends
/// to produce the same statement.
#[derive(Debug, Clone)]
pub struct GptClient {
    client: reqwest::Client,
    completions_url: Url,
    model: String,
}

impl GptClient {
    pub fn new(api_key: &str) -> Result<GptClient> {
        Self::with_api_base(api_key, OPENAI_API_ROOT)
    }

    /// Client for a different endpoint root, e.g. a proxy or a local model
    /// server. `api_base` is the path that `chat/completions` is appended to.
    pub fn with_api_base(api_key: &str, api_base: &str) -> Result<GptClient> {
        let mut def_headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))?;
        auth.set_sensitive(true);
        def_headers.insert(AUTHORIZATION, auth);
        def_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(def_headers)
            .build()?;

        let completions_url = Url::parse(&format!(
            "{}/chat/completions",
            api_base.trim_end_matches('/')
        ))?;

        Ok(GptClient {
            client,
            completions_url,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn make_completion_request(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let resp = self
            .client
            .post(self.completions_url.clone())
            .json(req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GptError::Status { status, body });
        }

        Ok(resp.json::<CompletionResponse>().await?)
    }

    fn completion_request(&self, system_prompt: &str, user_message: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system_prompt), Message::user(user_message)],
            temperature: Some(0.0),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LanguageBackend for GptClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> nlsql_core::errors::Result<String> {
        let req = self.completion_request(system_prompt, user_message);
        debug!(model = %req.model, url = %self.completions_url, "requesting completion");

        let resp = self.make_completion_request(&req).await?;
        Ok(resp.into_content()?)
    }
}
