//! 轮询循环 - 拉取、对账、投递、提交
//!
//! ## 每个 tick、每个事件类别
//! 1. 拉取最新快照；非 JSON 响应只记 warning 并跳过本轮
//! 2. 查账本，已记录则不处理
//! 3. 路由：被 watch 的讨论串直接压制；注册了监听器则交给监听器并立即提交；否则走 Notifier
//! 4. 投递尝试完成后提交账本，无论成功与否（at-most-once）

pub mod poll_loop;

pub use poll_loop::PollLoop;

use crate::model::{EventClass, NotificationEvent};
use std::sync::Arc;

/// 事件监听器
pub type EventListener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// 轮询状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Reconciling,
    Delivering,
    Committing,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Idle => "idle",
            PollState::Fetching => "fetching",
            PollState::Reconciling => "reconciling",
            PollState::Delivering => "delivering",
            PollState::Committing => "committing",
        }
    }
}

/// 单个事件类别一轮处理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 拉取失败，本轮跳过
    Skipped { reason: String },
    /// 账本中已存在
    AlreadySeen { id: String },
    /// 讨论串正被 watch，主循环不投递也不提交
    Suppressed { id: String, thread_id: String },
    /// 交给监听器并已提交
    Listener { id: String },
    /// 交给 watch 回调并已提交
    Watched { id: String },
    /// 投递成功并已提交
    Delivered { id: String },
    /// 投递失败但仍已提交；`retryable` 标记限流 / 服务端 / 网络类失败
    DeliveryFailed {
        id: String,
        error: String,
        retryable: bool,
    },
}

impl CycleOutcome {
    /// 本轮是否写入了账本
    pub fn committed(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Listener { .. }
                | CycleOutcome::Watched { .. }
                | CycleOutcome::Delivered { .. }
                | CycleOutcome::DeliveryFailed { .. }
        )
    }
}

/// 一个 tick 的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub posts: CycleOutcome,
    /// 按讨论串扫描时每个讨论串一条
    pub replies: Vec<CycleOutcome>,
}

/// 监听器能力标记，在构造时确定，运行期不再变化
#[derive(Clone, Default)]
pub struct Listeners {
    post: Option<EventListener>,
    reply: Option<EventListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_post<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(listener));
        self
    }

    pub fn on_new_reply<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.reply = Some(Arc::new(listener));
        self
    }

    pub fn has_post_listener(&self) -> bool {
        self.post.is_some()
    }

    pub fn has_reply_listener(&self) -> bool {
        self.reply.is_some()
    }

    pub fn for_class(&self, class: EventClass) -> Option<&EventListener> {
        match class {
            EventClass::Post => self.post.as_ref(),
            EventClass::Reply => self.reply.as_ref(),
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("has_post_listener", &self.has_post_listener())
            .field("has_reply_listener", &self.has_reply_listener())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_flags() {
        let listeners = Listeners::new();
        assert!(!listeners.has_post_listener());
        assert!(!listeners.has_reply_listener());

        let listeners = listeners.on_new_reply(|_| {});
        assert!(!listeners.has_post_listener());
        assert!(listeners.has_reply_listener());
        assert!(listeners.for_class(EventClass::Reply).is_some());
        assert!(listeners.for_class(EventClass::Post).is_none());
    }

    #[test]
    fn test_committed() {
        assert!(CycleOutcome::Delivered { id: "1".into() }.committed());
        assert!(CycleOutcome::DeliveryFailed {
            id: "1".into(),
            error: "x".into(),
            retryable: false
        }.committed());
        assert!(!CycleOutcome::AlreadySeen { id: "1".into() }.committed());
        assert!(!CycleOutcome::Suppressed { id: "1".into(), thread_id: "2".into() }.committed());
        assert!(!CycleOutcome::Skipped { reason: "x".into() }.committed());
    }
}
