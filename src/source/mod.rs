//! 上游讨论区数据源
//!
//! `SourceClient` 只负责拉取最新快照并把传输 / 解析错误归一化为 `FetchError`，
//! 去重与投递由轮询循环决定。

pub mod fandom;
pub mod parse;

pub use fandom::FandomClient;

use crate::error::FetchError;
use crate::model::{Post, ReplySnapshot};
use async_trait::async_trait;

/// 讨论区数据源
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// 全站最新帖子
    async fn fetch_latest_post(&self) -> Result<Post, FetchError>;

    /// 全站最新回复
    async fn fetch_latest_reply(&self) -> Result<ReplySnapshot, FetchError>;

    /// 指定讨论串的最新一条回复
    async fn fetch_thread_replies(&self, thread_id: &str) -> Result<ReplySnapshot, FetchError>;
}
