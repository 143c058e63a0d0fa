//! 去重账本 - 记录已经通知过的帖子 / 回复 ID
//!
//! 帖子与回复使用两个互不相交的账本文件，避免 ID 碰撞导致真实帖子被静默吞掉：
//! - `recent-post.json`：帖子 ID
//! - `replies.json`：回复 ID

pub mod store;

pub use store::LedgerStore;

use crate::config::NotifierConfig;
use crate::error::PersistenceError;
use crate::model::EventClass;
use std::path::Path;
use std::time::Duration;

/// 帖子账本文件名
pub const POST_LEDGER_FILE: &str = "recent-post.json";
/// 回复账本文件名
pub const REPLY_LEDGER_FILE: &str = "replies.json";

/// 帖子 + 回复两个账本
#[derive(Debug)]
pub struct Ledger {
    posts: LedgerStore,
    replies: LedgerStore,
}

impl Ledger {
    /// 在指定目录下打开（必要时创建）两个账本
    pub fn open(
        dir: &Path,
        read_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, PersistenceError> {
        Ok(Self {
            posts: LedgerStore::open(dir.join(POST_LEDGER_FILE), read_retries, retry_delay)?,
            replies: LedgerStore::open(dir.join(REPLY_LEDGER_FILE), read_retries, retry_delay)?,
        })
    }

    pub fn from_config(config: &NotifierConfig) -> Result<Self, PersistenceError> {
        Self::open(
            &config.data_dir,
            config.ledger_read_retries,
            config.ledger_retry_delay(),
        )
    }

    /// 只读查看目录下两个账本的内容（帖子，回复），不会创建任何文件
    pub fn inspect(dir: &Path) -> Result<(Vec<String>, Vec<String>), PersistenceError> {
        Ok((
            LedgerStore::peek(&dir.join(POST_LEDGER_FILE))?,
            LedgerStore::peek(&dir.join(REPLY_LEDGER_FILE))?,
        ))
    }

    /// 按事件类别选择账本
    pub fn store(&self, class: EventClass) -> &LedgerStore {
        match class {
            EventClass::Post => &self.posts,
            EventClass::Reply => &self.replies,
        }
    }

    pub fn posts(&self) -> &LedgerStore {
        &self.posts
    }

    pub fn replies(&self) -> &LedgerStore {
        &self.replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_post_and_reply_ledgers_are_disjoint() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path(), 3, Duration::from_millis(1)).unwrap();

        ledger.store(EventClass::Post).add("42").await.unwrap();

        assert!(ledger.posts().contains("42").await.unwrap());
        assert!(!ledger.replies().contains("42").await.unwrap());
        assert!(dir.path().join(POST_LEDGER_FILE).exists());
        assert!(dir.path().join(REPLY_LEDGER_FILE).exists());
    }

    #[test]
    fn test_inspect_missing_dir_creates_nothing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("never-created");

        let (posts, replies) = Ledger::inspect(&missing).unwrap();
        assert!(posts.is_empty());
        assert!(replies.is_empty());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_inspect_reads_existing_ledgers() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path(), 3, Duration::from_millis(1)).unwrap();
        ledger.posts().add("100").await.unwrap();
        ledger.replies().add("201").await.unwrap();
        std::fs::remove_file(dir.path().join(REPLY_LEDGER_FILE)).unwrap();

        let (posts, replies) = Ledger::inspect(dir.path()).unwrap();
        assert_eq!(posts, vec!["100".to_string()]);
        assert!(replies.is_empty());
        assert!(!dir.path().join(REPLY_LEDGER_FILE).exists());
    }
}
