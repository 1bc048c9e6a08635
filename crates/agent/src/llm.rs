use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use premia_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Text-completion oracle used by the reasoner.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat-completions client for OpenAI, Azure OpenAI and Ollama's
/// OpenAI-compatible endpoint. Requests run at temperature 0.
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint: chat_endpoint(config)?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> Result<String, RequestFailure> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = match self.provider {
                LlmProvider::AzureOpenAi => builder.header("api-key", api_key.expose_secret()),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    builder.bearer_auth(api_key.expose_secret())
                }
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|error| RequestFailure::Retryable(anyhow!("llm request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = anyhow!("llm api returned {status}: {body}");
            return Err(if is_retryable(status) {
                RequestFailure::Retryable(error)
            } else {
                RequestFailure::Fatal(error)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| RequestFailure::Fatal(anyhow!("invalid llm response: {error}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RequestFailure::Fatal(anyhow!("llm response contained no choices")))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest { model: &self.model, messages, temperature: 0.0 };
        debug!(
            event_name = "llm.request.sent",
            provider = self.provider.as_str(),
            model = %self.model,
            message_count = messages.len(),
            "sending chat completion request"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(RequestFailure::Retryable(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "retrying chat completion"
                    );
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1)).await;
                }
                Err(RequestFailure::Retryable(error)) | Err(RequestFailure::Fatal(error)) => {
                    return Err(error)
                }
            }
        }
    }
}

/// Chat-completions URL for the configured provider.
pub fn chat_endpoint(config: &LlmConfig) -> Result<String> {
    let base = config.base_url.as_deref().map(|url| url.trim().trim_end_matches('/'));

    match config.provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            let base = match (config.provider, base) {
                (_, Some(base)) if !base.is_empty() => base,
                (LlmProvider::OpenAi, _) => OPENAI_BASE_URL,
                _ => bail!("llm.base_url is required for the ollama provider"),
            };
            if base.ends_with("/v1") {
                Ok(format!("{base}/chat/completions"))
            } else {
                Ok(format!("{base}/v1/chat/completions"))
            }
        }
        LlmProvider::AzureOpenAi => {
            let Some(base) = base.filter(|base| !base.is_empty()) else {
                bail!("llm.base_url is required for the azure_openai provider");
            };
            let version = config
                .api_version
                .as_deref()
                .filter(|version| !version.trim().is_empty())
                .ok_or_else(|| anyhow!("llm.api_version is required for the azure_openai provider"))?;
            Ok(format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={}",
                config.model.trim(),
                version.trim()
            ))
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

enum RequestFailure {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
