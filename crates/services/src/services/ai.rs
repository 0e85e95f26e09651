//! AI-assisted content for posts, review replies and profile copy.
//!
//! Providers are tried in order; when all of them fail, or none is
//! configured, a canned text is returned instead. [`AiService::generate`]
//! never fails.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::services::config::AiConfig;

#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("request to {provider} failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned HTTP {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0} returned no text")]
    EmptyResponse(&'static str),
    #[error("failed to decode {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    ReviewReply,
    BusinessDescription,
    KeywordIdeas,
}

impl ContentKind {
    /// Google's length limit for the field the text ends up in.
    fn max_chars(self) -> Option<usize> {
        match self {
            Self::Post => Some(1500),
            Self::ReviewReply => Some(4096),
            Self::BusinessDescription => Some(750),
            Self::KeywordIdeas => None,
        }
    }
}

/// Facts the prompt is built from. All optional.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct GenerateContext {
    pub business_name: Option<String>,
    pub category: Option<String>,
    pub locality: Option<String>,
    /// Post topic, offer details or seed keywords.
    pub topic: Option<String>,
    pub tone: Option<String>,
    pub reviewer_name: Option<String>,
    pub review_text: Option<String>,
    pub star_rating: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct GenerateRequest {
    pub kind: ContentKind,
    #[serde(default)]
    pub context: GenerateContext,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct Generated {
    pub text: String,
    /// Provider that produced the text; `None` for canned text.
    pub provider: Option<String>,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, prompt: &Prompt) -> Result<String, AiError>;
}

async fn send_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, AiError> {
    let response = request.send().await.map_err(|e| AiError::Transport {
        provider,
        message: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AiError::Api {
            provider,
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        });
    }
    response.json().await.map_err(|e| AiError::Decode {
        provider,
        message: e.to_string(),
    })
}

pub struct OpenAiProvider {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(http: Client, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, AiError> {
        let body = json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);
        let value = send_json(self.name(), request).await?;
        let completion: ChatCompletion =
            serde_json::from_value(value).map_err(|e| AiError::Decode {
                provider: self.name(),
                message: e.to_string(),
            })?;
        completion
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyResponse(self.name()))
    }
}

pub struct AnthropicProvider {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(http: Client, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.into(),
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, AiError> {
        let body = json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "system": prompt.system,
            "messages": [{ "role": "user", "content": prompt.user }],
        });
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .json(&body);
        let value = send_json(self.name(), request).await?;
        let response: MessagesResponse =
            serde_json::from_value(value).map_err(|e| AiError::Decode {
                provider: self.name(),
                message: e.to_string(),
            })?;
        let text = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse(self.name()));
        }
        Ok(text)
    }
}

pub struct AiService {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl AiService {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    /// OpenAI first, then Anthropic, for whichever keys are set.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(utils::build_info::USER_AGENT)
            .build()
            .map_err(|e| AiError::Client(e.to_string()))?;

        let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();
        if let Some(key) = &config.openai_api_key {
            providers.push(Arc::new(OpenAiProvider::new(
                http.clone(),
                key.clone(),
                &config.openai_model,
            )));
        }
        if let Some(key) = &config.anthropic_api_key {
            providers.push(Arc::new(AnthropicProvider::new(
                http,
                key.clone(),
                &config.anthropic_model,
            )));
        }
        Ok(Self::new(providers))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn generate(&self, kind: ContentKind, context: &GenerateContext) -> Generated {
        let prompt = build_prompt(kind, context);
        for provider in &self.providers {
            match provider.complete(&prompt).await {
                Ok(text) => {
                    debug!(provider = provider.name(), ?kind, "Generated content");
                    return Generated {
                        text: clamp(kind, text.trim()),
                        provider: Some(provider.name().to_string()),
                        fallback: false,
                    };
                }
                Err(e) => warn!(provider = provider.name(), ?kind, error = %e, "Completion failed"),
            }
        }

        Generated {
            text: clamp(kind, &fallback_text(kind, context)),
            provider: None,
            fallback: true,
        }
    }
}

fn clamp(kind: ContentKind, text: &str) -> String {
    match kind.max_chars() {
        Some(max) if text.chars().count() > max => {
            let cut: String = text.chars().take(max).collect();
            cut.trim_end().to_string()
        }
        _ => text.to_string(),
    }
}

fn describe_business(context: &GenerateContext) -> String {
    let mut description = context
        .business_name
        .clone()
        .unwrap_or_else(|| "a local business".to_string());
    if let Some(category) = &context.category {
        description.push_str(&format!(" ({category})"));
    }
    if let Some(locality) = &context.locality {
        description.push_str(&format!(" in {locality}"));
    }
    description
}

pub fn build_prompt(kind: ContentKind, context: &GenerateContext) -> Prompt {
    let business = describe_business(context);
    let tone = context.tone.as_deref().unwrap_or("friendly and professional");

    let (system, user, max_tokens) = match kind {
        ContentKind::Post => (
            "You write Google Business Profile posts. Keep them under 1500 characters, \
             no hashtags, end with a clear call to action.",
            format!(
                "Write a {tone} post for {business} about: {}.",
                context.topic.as_deref().unwrap_or("what's new this week")
            ),
            400,
        ),
        ContentKind::ReviewReply => {
            let rating = context
                .star_rating
                .map(|r| format!("{r}-star"))
                .unwrap_or_else(|| "customer".to_string());
            let reviewer = context.reviewer_name.as_deref().unwrap_or("the customer");
            (
                "You reply to Google reviews on behalf of the business owner. Be brief, \
                 thank the reviewer, address concerns without arguing, never offer refunds.",
                format!(
                    "Write a {tone} reply from {business} to this {rating} review by {reviewer}:\n\n{}",
                    context.review_text.as_deref().unwrap_or("(no comment left)")
                ),
                300,
            )
        }
        ContentKind::BusinessDescription => (
            "You write Google Business Profile descriptions. Plain text, at most 750 \
             characters, no URLs or phone numbers.",
            format!(
                "Write a {tone} business description for {business}.{}",
                context
                    .topic
                    .as_deref()
                    .map(|t| format!(" Highlight: {t}."))
                    .unwrap_or_default()
            ),
            300,
        ),
        ContentKind::KeywordIdeas => (
            "You suggest local SEO keywords. Return one keyword phrase per line, \
             lowercase, no numbering.",
            format!(
                "Suggest 15 search keywords customers would use to find {business}.{}",
                context
                    .topic
                    .as_deref()
                    .map(|t| format!(" Seed keywords: {t}."))
                    .unwrap_or_default()
            ),
            300,
        ),
    };

    Prompt {
        system: system.to_string(),
        user,
        max_tokens,
    }
}

pub fn fallback_text(kind: ContentKind, context: &GenerateContext) -> String {
    let name = context.business_name.as_deref().unwrap_or("our business");
    match kind {
        ContentKind::Post => format!(
            "Visit {name} this week! We're ready to help with everything you need. \
             Stop by or get in touch today."
        ),
        ContentKind::ReviewReply => match context.star_rating {
            Some(rating) if rating <= 3 => format!(
                "Thank you for your feedback. We're sorry your experience at {name} fell short. \
                 Please contact us directly so we can make it right."
            ),
            _ => format!(
                "Thank you so much for your kind review! Everyone at {name} appreciates your \
                 support and we look forward to seeing you again."
            ),
        },
        ContentKind::BusinessDescription => format!(
            "{name} is committed to friendly service and quality you can count on. \
             Contact us today to learn more."
        ),
        ContentKind::KeywordIdeas => {
            let category = context
                .category
                .as_deref()
                .unwrap_or("business")
                .to_lowercase();
            match &context.locality {
                Some(locality) => {
                    let locality = locality.to_lowercase();
                    format!(
                        "{category} near me\nbest {category} in {locality}\n{category} {locality}\n\
                         {category} open now"
                    )
                }
                None => format!("{category} near me\nbest {category}\n{category} open now"),
            }
        }
    }
}
