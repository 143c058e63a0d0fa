//! 通知投递层
//!
//! - `Notifier` trait：投递接口，轮询循环只依赖它
//! - `DiscordWebhook`：HTTP Webhook 实现
//! - `MessageFormatter`：把帖子 / 回复事件渲染为文本或结构化消息

pub mod formatter;
pub mod webhook;

pub use formatter::{truncate_footer, MessageFormatter, FOOTER_MAX_CHARS, POST_COLOR, REPLY_COLOR};
pub use webhook::{DiscordWebhook, WebhookConfig};

use crate::error::DeliveryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 结构化（embed）消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredMessage {
    /// 正文描述（markdown）
    pub description: String,
    /// 作者显示名
    pub author_name: String,
    /// 作者头像 URL（已套用默认头像）
    pub author_icon_url: String,
    /// 页脚文本（已截断）
    pub footer: String,
    /// 区分新帖 / 新回复的颜色
    pub color: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

/// 通知投递接口
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 投递端名称（用于日志）
    fn name(&self) -> &str;

    /// 发送纯文本消息
    async fn send(&self, message: &str) -> Result<(), DeliveryError>;

    /// 发送结构化消息
    async fn send_rich(&self, message: &StructuredMessage) -> Result<(), DeliveryError>;
}

/// 空消息直接拒绝，不发起网络请求
pub fn ensure_text(message: &str) -> Result<(), DeliveryError> {
    if message.trim().is_empty() {
        Err(DeliveryError::EmptyMessage)
    } else {
        Ok(())
    }
}
