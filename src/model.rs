//! 领域数据结构 - 帖子、回复与通知事件
//!
//! 上游 API 的 ID 有时是字符串、有时是数字，这里统一归一化为 `String`。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 作者信息（wire: `createdBy`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 新帖子（讨论串）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub forum_id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub forum_name: String,
    #[serde(default)]
    pub created_by: Author,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub raw_content: String,
    /// 创建时间（wire: `creationDate.epochSecond`）
    #[serde(
        default,
        rename = "creationDate",
        deserialize_with = "de_creation_date",
        skip_serializing
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// 回复，与 Post 同构但多了所属讨论串 ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub forum_id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub forum_name: String,
    #[serde(default)]
    pub created_by: Author,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub raw_content: String,
    #[serde(rename = "threadId", alias = "parentThreadId", deserialize_with = "de_id")]
    pub parent_thread_id: String,
    #[serde(
        default,
        rename = "creationDate",
        deserialize_with = "de_creation_date",
        skip_serializing
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Reply {
    /// 上游没有附带讨论串信息时，用回复自身字段拼出父级上下文
    pub fn fallback_thread(&self) -> ThreadContext {
        ThreadContext {
            id: self.parent_thread_id.clone(),
            title: self.title.clone(),
            forum_id: self.forum_id.clone(),
            forum_name: self.forum_name.clone(),
        }
    }
}

/// 回复所属讨论串的上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub forum_id: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub forum_name: String,
}

/// 一次回复拉取的结果：回复本身、父级上下文、原始快照
#[derive(Debug, Clone, PartialEq)]
pub struct ReplySnapshot {
    pub reply: Reply,
    pub thread: ThreadContext,
    /// 原始响应文档，原样交给 watch 回调
    pub raw: Value,
}

/// 事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Post,
    Reply,
}

impl EventClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Post => "post",
            EventClass::Reply => "reply",
        }
    }
}

impl std::fmt::Display for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个 tick 内构造、立即消费的通知事件
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    NewPost(Post),
    NewReply { reply: Reply, thread: ThreadContext },
}

impl NotificationEvent {
    pub fn class(&self) -> EventClass {
        match self {
            NotificationEvent::NewPost(_) => EventClass::Post,
            NotificationEvent::NewReply { .. } => EventClass::Reply,
        }
    }

    /// 用于账本去重的 ID
    pub fn id(&self) -> &str {
        match self {
            NotificationEvent::NewPost(post) => &post.id,
            NotificationEvent::NewReply { reply, .. } => &reply.id,
        }
    }

    pub fn author(&self) -> &Author {
        match self {
            NotificationEvent::NewPost(post) => &post.created_by,
            NotificationEvent::NewReply { reply, .. } => &reply.created_by,
        }
    }

    pub fn raw_content(&self) -> &str {
        match self {
            NotificationEvent::NewPost(post) => &post.raw_content,
            NotificationEvent::NewReply { reply, .. } => &reply.raw_content,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            NotificationEvent::NewPost(post) => post.created_at,
            NotificationEvent::NewReply { reply, .. } => reply.created_at,
        }
    }
}

/// 把 JSON 字符串或数字转换为 ID 字符串
pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {}", value)))
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value).unwrap_or_default())
}

fn de_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_creation_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .get("epochSecond")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
}
