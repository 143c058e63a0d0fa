//! 消息格式化 - 帖子 / 回复事件到 Webhook 消息
//!
//! 文本格式：
//! ```text
//! [Alice](https://x.fandom.com/wiki/User:Alice) posted [Hello](<https://x.fandom.com/f/p/100>) in [General](https://x.fandom.com/f?catId=5)
//! [Bob](https://x.fandom.com/wiki/User:Bob) posted a [reply](<https://x.fandom.com/f/p/100/r/201>) to [Hello](<...>) in [General](...)
//! ```

use super::StructuredMessage;
use crate::config::NotifierConfig;
use crate::model::{NotificationEvent, Post, Reply, ThreadContext};
use reqwest::Url;

/// 页脚最大长度（字符）
pub const FOOTER_MAX_CHARS: usize = 256;

const ELLIPSIS: &str = "...";

/// 新帖颜色
pub const POST_COLOR: u32 = 0x2ECC71;
/// 新回复颜色
pub const REPLY_COLOR: u32 = 0x3498DB;

/// 截断页脚：超过 256 字符时保留前 253 个字符并追加 `...`
pub fn truncate_footer(body: &str) -> String {
    if body.chars().count() <= FOOTER_MAX_CHARS {
        return body.to_string();
    }
    let keep = FOOTER_MAX_CHARS - ELLIPSIS.chars().count();
    let mut truncated: String = body.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// 消息格式化器
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    site_url: String,
    default_avatar_url: String,
}

impl MessageFormatter {
    pub fn new(site_url: impl Into<String>, default_avatar_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into().trim_end_matches('/').to_string(),
            default_avatar_url: default_avatar_url.into(),
        }
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.site_url(), config.default_avatar_url.clone())
    }

    /// 用户页链接，用户名做 URL 编码
    pub fn user_url(&self, name: &str) -> String {
        let fallback = || format!("{}/wiki/User:{}", self.site_url, name.replace(' ', "_"));

        let Ok(mut url) = Url::parse(&self.site_url) else {
            return fallback();
        };
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.clear().push("wiki").push(&format!("User:{}", name));
            }
            Err(()) => return fallback(),
        }
        url.to_string()
    }

    pub fn thread_url(&self, thread_id: &str) -> String {
        format!("{}/f/p/{}", self.site_url, thread_id)
    }

    pub fn reply_url(&self, thread_id: &str, reply_id: &str) -> String {
        format!("{}/f/p/{}/r/{}", self.site_url, thread_id, reply_id)
    }

    pub fn forum_url(&self, forum_id: &str) -> String {
        format!("{}/f?catId={}", self.site_url, forum_id)
    }

    /// 新帖文本
    pub fn post_text(&self, post: &Post) -> String {
        format!(
            "[{}]({}) posted [{}](<{}>) in [{}]({})",
            post.created_by.name,
            self.user_url(&post.created_by.name),
            post.title,
            self.thread_url(&post.id),
            post.forum_name,
            self.forum_url(&post.forum_id),
        )
    }

    /// 新回复文本
    pub fn reply_text(&self, reply: &Reply, thread: &ThreadContext) -> String {
        format!(
            "[{}]({}) posted a [reply](<{}>) to [{}](<{}>) in [{}]({})",
            reply.created_by.name,
            self.user_url(&reply.created_by.name),
            self.reply_url(&thread.id, &reply.id),
            thread.title,
            self.thread_url(&thread.id),
            thread.forum_name,
            self.forum_url(&thread.forum_id),
        )
    }

    pub fn render_text(&self, event: &NotificationEvent) -> String {
        match event {
            NotificationEvent::NewPost(post) => self.post_text(post),
            NotificationEvent::NewReply { reply, thread } => self.reply_text(reply, thread),
        }
    }

    pub fn render_rich(&self, event: &NotificationEvent) -> StructuredMessage {
        let author = event.author();
        let color = match event {
            NotificationEvent::NewPost(_) => POST_COLOR,
            NotificationEvent::NewReply { .. } => REPLY_COLOR,
        };

        StructuredMessage {
            description: self.render_text(event),
            author_name: author.name.clone(),
            author_icon_url: author
                .avatar_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| self.default_avatar_url.clone()),
            footer: truncate_footer(event.raw_content()),
            color,
            timestamp: event.created_at(),
        }
    }
}
