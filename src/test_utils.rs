//! 单元测试共用的 mock 数据源与投递端

use crate::config::NotifierConfig;
use crate::error::{DeliveryError, FetchError};
use crate::model::{Author, Post, Reply, ReplySnapshot, ThreadContext};
use crate::notifier::{Notifier, StructuredMessage};
use crate::source::SourceClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// 指向临时目录、1 秒轮询间隔、快速重试的配置
pub fn test_config(dir: &Path) -> NotifierConfig {
    let mut config = NotifierConfig::new("community", "123", "secret");
    config.data_dir = dir.to_path_buf();
    config.poll_interval_secs = 1;
    config.ledger_retry_delay_ms = 1;
    config
}

pub fn post(id: &str, title: &str) -> Post {
    Post {
        id: id.to_string(),
        title: title.to_string(),
        forum_id: "5".to_string(),
        forum_name: "General".to_string(),
        created_by: Author {
            name: "Alice".to_string(),
            avatar_url: None,
        },
        raw_content: format!("{} body", title),
        created_at: None,
    }
}

pub fn reply_snapshot(id: &str, thread_id: &str) -> ReplySnapshot {
    let reply = Reply {
        id: id.to_string(),
        title: String::new(),
        forum_id: "5".to_string(),
        forum_name: "General".to_string(),
        created_by: Author {
            name: "Bob".to_string(),
            avatar_url: Some("https://img/bob.png".to_string()),
        },
        raw_content: "a reply".to_string(),
        parent_thread_id: thread_id.to_string(),
        created_at: None,
    };
    ReplySnapshot {
        thread: ThreadContext {
            id: thread_id.to_string(),
            title: "Hello".to_string(),
            forum_id: "5".to_string(),
            forum_name: "General".to_string(),
        },
        raw: serde_json::json!({"id": thread_id, "_embedded": {"doc:posts": [{"id": id}]}}),
        reply,
    }
}

/// 可编程的数据源，未设置的响应返回 `NotFound`
pub struct MockSource {
    post: Mutex<Option<Result<Post, FetchError>>>,
    latest_reply: Mutex<Option<Result<ReplySnapshot, FetchError>>>,
    thread_replies: Mutex<HashMap<String, Result<ReplySnapshot, FetchError>>>,
    thread_delays: Mutex<HashMap<String, Duration>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            post: Mutex::new(None),
            latest_reply: Mutex::new(None),
            thread_replies: Mutex::new(HashMap::new()),
            thread_delays: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_post(&self, response: Result<Post, FetchError>) {
        *self.post.lock().unwrap() = Some(response);
    }

    pub fn set_latest_reply(&self, response: Result<ReplySnapshot, FetchError>) {
        *self.latest_reply.lock().unwrap() = Some(response);
    }

    pub fn set_thread_reply(&self, thread_id: &str, response: Result<ReplySnapshot, FetchError>) {
        self.thread_replies
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), response);
    }

    /// 该讨论串的响应延迟返回
    pub fn set_thread_delay(&self, thread_id: &str, delay: Duration) {
        self.thread_delays
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), delay);
    }
}

#[async_trait]
impl SourceClient for MockSource {
    async fn fetch_latest_post(&self) -> Result<Post, FetchError> {
        self.post
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(FetchError::NotFound("threads".into())))
    }

    async fn fetch_latest_reply(&self) -> Result<ReplySnapshot, FetchError> {
        self.latest_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(FetchError::NotFound("doc:posts".into())))
    }

    async fn fetch_thread_replies(&self, thread_id: &str) -> Result<ReplySnapshot, FetchError> {
        let delay = self.thread_delays.lock().unwrap().get(thread_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.thread_replies
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound("doc:posts".into())))
    }
}

/// 记录所有投递的 mock 投递端
pub struct MockNotifier {
    texts: Mutex<Vec<String>>,
    rich: Mutex<Vec<StructuredMessage>>,
    failure: Mutex<Option<DeliveryError>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
            rich: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// 之后的每次投递都返回该错误（仍会被记录）
    pub fn fail_with(&self, error: DeliveryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn rich(&self) -> Vec<StructuredMessage> {
        self.rich.lock().unwrap().clone()
    }

    pub fn rich_count(&self) -> usize {
        self.rich.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.texts.lock().unwrap().len() + self.rich_count()
    }

    fn outcome(&self) -> Result<(), DeliveryError> {
        match self.failure.lock().unwrap().as_ref() {
            None => Ok(()),
            Some(DeliveryError::EmptyMessage) => Err(DeliveryError::EmptyMessage),
            Some(DeliveryError::Rejected { status, body }) => Err(DeliveryError::Rejected {
                status: *status,
                body: body.clone(),
            }),
            Some(DeliveryError::Unreachable(msg)) => Err(DeliveryError::Unreachable(msg.clone())),
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, message: &str) -> Result<(), DeliveryError> {
        self.texts.lock().unwrap().push(message.to_string());
        self.outcome()
    }

    async fn send_rich(&self, message: &StructuredMessage) -> Result<(), DeliveryError> {
        self.rich.lock().unwrap().push(message.clone());
        self.outcome()
    }
}
