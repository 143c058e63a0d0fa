//! Watch 注册表 - 记录被单独监听的讨论串及其订阅者
//!
//! 被监听讨论串的回复只通过 watch 回调投递，主轮询循环只读此表。
//! 每个讨论串只有一个 watch 子循环，新回复会分发给该讨论串的全部订阅者。

use super::WatchCallback;
use crate::error::PersistenceError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;

type WatchTask = JoinHandle<Result<(), PersistenceError>>;

struct ThreadWatch {
    subscribers: Vec<(u64, WatchCallback)>,
    task: Option<WatchTask>,
}

impl std::fmt::Debug for ThreadWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadWatch")
            .field("subscribers", &self.subscribers.len())
            .field("running", &self.task.as_ref().map(|t| !t.is_finished()))
            .finish()
    }
}

/// 被监听讨论串集合（可跨任务共享）
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    threads: Arc<RwLock<HashMap<String, ThreadWatch>>>,
    next_id: Arc<AtomicU64>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ThreadWatch>> {
        match self.threads.read() {
            Ok(threads) => threads,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ThreadWatch>> {
        match self.threads.write() {
            Ok(threads) => threads,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 添加订阅者，返回订阅 ID 以及是否需要为该讨论串启动子循环
    pub(crate) fn subscribe(&self, thread_id: &str, callback: WatchCallback) -> (u64, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut threads = self.write();
        let entry = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ThreadWatch {
                subscribers: Vec::new(),
                task: None,
            });
        entry.subscribers.push((id, callback));
        let needs_loop = entry.task.as_ref().map_or(true, |task| task.is_finished());
        (id, needs_loop)
    }

    /// 绑定讨论串的子循环任务；讨论串已无订阅者时直接终止任务
    pub(crate) fn attach_task(&self, thread_id: &str, task: WatchTask) {
        let mut threads = self.write();
        match threads.get_mut(thread_id) {
            Some(entry) => {
                if let Some(old) = entry.task.replace(task) {
                    old.abort();
                }
            }
            None => task.abort(),
        }
    }

    /// 移除订阅者。最后一个订阅者离开时终止子循环并返回 `true`
    pub(crate) fn unsubscribe(&self, thread_id: &str, id: u64) -> bool {
        let mut threads = self.write();
        let Some(entry) = threads.get_mut(thread_id) else {
            return false;
        };
        entry.subscribers.retain(|(sub_id, _)| *sub_id != id);
        if !entry.subscribers.is_empty() {
            return false;
        }

        if let Some(task) = threads.remove(thread_id).and_then(|entry| entry.task) {
            task.abort();
        }
        true
    }

    /// 该讨论串当前全部订阅回调（按订阅顺序）
    pub fn callbacks(&self, thread_id: &str) -> Vec<WatchCallback> {
        self.read()
            .get(thread_id)
            .map(|entry| entry.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, thread_id: &str) -> bool {
        self.read().contains_key(thread_id)
    }

    pub(crate) fn is_subscribed(&self, thread_id: &str, id: u64) -> bool {
        self.read()
            .get(thread_id)
            .is_some_and(|entry| entry.subscribers.iter().any(|(sub_id, _)| *sub_id == id))
    }

    /// 子循环是否仍在运行
    pub fn is_running(&self, thread_id: &str) -> bool {
        self.read()
            .get(thread_id)
            .and_then(|entry| entry.task.as_ref())
            .is_some_and(|task| !task.is_finished())
    }

    pub fn subscriber_count(&self, thread_id: &str) -> usize {
        self.read()
            .get(thread_id)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// 当前监听的讨论串（排序后返回）
    pub fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reply;
    use serde_json::Value;

    fn noop() -> WatchCallback {
        Arc::new(|_: &Reply, _: &Value| {})
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let registry = WatchRegistry::new();
        assert!(!registry.is_watching("100"));

        let (first, needs_loop) = registry.subscribe("100", noop());
        assert!(needs_loop);
        let (second, _) = registry.subscribe("100", noop());
        assert_ne!(first, second);
        assert!(registry.is_watching("100"));
        assert_eq!(registry.subscriber_count("100"), 2);
        assert_eq!(registry.len(), 1);

        // 第二个订阅仍在
        assert!(!registry.unsubscribe("100", first));
        assert!(registry.is_watching("100"));
        assert!(!registry.is_subscribed("100", first));
        assert!(registry.is_subscribed("100", second));

        assert!(registry.unsubscribe("100", second));
        assert!(!registry.is_watching("100"));
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe("100", second));
    }

    #[tokio::test]
    async fn test_one_loop_per_thread() {
        let registry = WatchRegistry::new();
        let (first, needs_loop) = registry.subscribe("100", noop());
        assert!(needs_loop);
        registry.attach_task(
            "100",
            tokio::spawn(std::future::pending::<Result<(), PersistenceError>>()),
        );
        assert!(registry.is_running("100"));

        let (second, needs_loop) = registry.subscribe("100", noop());
        assert!(!needs_loop);
        assert_eq!(registry.callbacks("100").len(), 2);

        registry.unsubscribe("100", first);
        assert!(registry.is_running("100"));
        registry.unsubscribe("100", second);
        assert!(!registry.is_running("100"));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = WatchRegistry::new();
        let view = registry.clone();

        registry.subscribe("b", noop());
        registry.subscribe("a", noop());

        assert!(view.is_watching("a"));
        assert_eq!(view.watched(), vec!["a".to_string(), "b".to_string()]);
    }
}
