//! 单个讨论串的 watch 子循环与订阅句柄
//!
//! 每个被监听的讨论串有且只有一个子循环，定时器与主循环的 tick 互不对齐。
//! 新回复只提交一次账本，并依次交给该讨论串的全部订阅回调。
//! `WatchHandle` 被 cancel 或 drop 时移除自己的订阅；最后一个订阅离开时子循环随之停止。

use super::WatchRegistry;
use crate::error::PersistenceError;
use crate::ledger::Ledger;
use crate::model::Reply;
use crate::poller::CycleOutcome;
use crate::source::SourceClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// watch 回调：新回复 + 原始讨论串快照
pub type WatchCallback = Arc<dyn Fn(&Reply, &Value) + Send + Sync>;

/// 检查一次被监听讨论串的最新回复，新回复分发给全部 `callbacks`
pub async fn check_thread_once(
    source: &dyn SourceClient,
    ledger: &Ledger,
    thread_id: &str,
    callbacks: &[WatchCallback],
) -> Result<CycleOutcome, PersistenceError> {
    let snapshot = match source.fetch_thread_replies(thread_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            if e.is_graceful_skip() {
                warn!(thread_id = %thread_id, error = %e, "Invalid watch response, skipping tick");
            } else {
                debug!(thread_id = %thread_id, error = %e, "Watch fetch skipped");
            }
            return Ok(CycleOutcome::Skipped {
                reason: e.to_string(),
            });
        }
    };

    let id = snapshot.reply.id.clone();
    if ledger.replies().contains(&id).await? {
        return Ok(CycleOutcome::AlreadySeen { id });
    }

    for callback in callbacks {
        callback(&snapshot.reply, &snapshot.raw);
    }
    ledger.replies().add(&id).await?;
    info!(
        thread_id = %thread_id,
        id = %id,
        subscribers = callbacks.len(),
        "Watched reply delivered to callbacks"
    );
    Ok(CycleOutcome::Watched { id })
}

/// watch 子循环，直到关闭信号、订阅者全部离开或账本致命错误
pub async fn run_watch(
    source: Arc<dyn SourceClient>,
    ledger: Arc<Ledger>,
    registry: WatchRegistry,
    thread_id: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), PersistenceError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let callbacks = registry.callbacks(&thread_id);
                if callbacks.is_empty() {
                    debug!(thread_id = %thread_id, "No subscribers left, watch loop stopped");
                    return Ok(());
                }
                if let Err(e) = check_thread_once(source.as_ref(), &ledger, &thread_id, &callbacks).await {
                    error!(thread_id = %thread_id, error = %e, "Watch loop stopped on ledger failure");
                    return Err(e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(thread_id = %thread_id, "Watch loop stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// watch 订阅句柄。cancel 或 drop 时取消该订阅
#[derive(Debug)]
pub struct WatchHandle {
    thread_id: String,
    subscription: u64,
    registry: WatchRegistry,
    active: bool,
}

impl WatchHandle {
    pub(crate) fn new(thread_id: String, subscription: u64, registry: WatchRegistry) -> Self {
        Self {
            thread_id,
            subscription,
            registry,
            active: true,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// 订阅已失效，或讨论串的子循环已结束（关闭或出错）
    pub fn is_finished(&self) -> bool {
        !self.registry.is_subscribed(&self.thread_id, self.subscription)
            || !self.registry.is_running(&self.thread_id)
    }

    /// 停止接收回调；没有其他订阅者时恢复该讨论串的默认通知路径
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let last = self.registry.unsubscribe(&self.thread_id, self.subscription);
        info!(thread_id = %self.thread_id, stopped_loop = last, "Watch cancelled");
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
