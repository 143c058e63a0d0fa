//! Discord Webhook 客户端
//!
//! 通过 `POST {base}/{id}/{token}` 发送 `{content}` 或 `{embeds: [...]}`

use super::{ensure_text, Notifier, StructuredMessage};
use crate::config::{NotifierConfig, DEFAULT_WEBHOOK_BASE_URL};
use crate::error::{ConfigError, DeliveryError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Webhook 客户端配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook API 基础 URL
    pub base_url: String,
    /// Webhook ID
    pub id: String,
    /// Webhook token
    pub token: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEBHOOK_BASE_URL.to_string(),
            id: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

impl From<&NotifierConfig> for WebhookConfig {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            base_url: config.webhook_base_url.clone(),
            id: config.webhook_id.clone(),
            token: config.webhook_token.clone(),
            timeout_secs: config.request_timeout_secs,
        }
    }
}

/// 纯文本载荷
#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    content: &'a str,
}

/// embed 载荷
#[derive(Debug, Serialize)]
struct EmbedPayload<'a> {
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    description: &'a str,
    author: EmbedAuthor<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor<'a> {
    icon_url: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

impl<'a> From<&'a StructuredMessage> for EmbedPayload<'a> {
    fn from(message: &'a StructuredMessage) -> Self {
        let footer = (!message.footer.trim().is_empty()).then(|| EmbedFooter {
            text: &message.footer,
        });

        Self {
            embeds: vec![Embed {
                description: &message.description,
                author: EmbedAuthor {
                    icon_url: &message.author_icon_url,
                    name: &message.author_name,
                },
                footer,
                color: message.color,
                timestamp: message.timestamp.map(|ts| ts.to_rfc3339()),
            }],
        }
    }
}

/// Discord Webhook 客户端
#[derive(Debug)]
pub struct DiscordWebhook {
    client: Client,
    config: WebhookConfig,
}

impl DiscordWebhook {
    /// 创建新的 Webhook 客户端
    pub fn new(config: WebhookConfig) -> Result<Self, ConfigError> {
        if config.id.is_empty() {
            return Err(ConfigError::MissingParameter("id"));
        }
        if config.token.is_empty() {
            return Err(ConfigError::MissingParameter("token"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "webhook",
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Webhook 地址，token 嵌在路径中
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.id,
            self.config.token
        )
    }

    async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(webhook_id = %self.config.id, status = %status, "Webhook accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(webhook_id = %self.config.id, status = %status, body = %body, "Webhook rejected message");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    fn name(&self) -> &str {
        "discord_webhook"
    }

    async fn send(&self, message: &str) -> Result<(), DeliveryError> {
        ensure_text(message)?;
        self.post(&TextPayload { content: message }).await
    }

    async fn send_rich(&self, message: &StructuredMessage) -> Result<(), DeliveryError> {
        ensure_text(&message.description)?;
        self.post(&EmbedPayload::from(message)).await
    }
}
