//! 主轮询循环

use super::{CycleOutcome, Listeners, PollState, TickReport};
use crate::config::{MessageStyle, NotifierConfig, ReplyScan};
use crate::error::{DeliveryError, FetchError, PersistenceError};
use crate::ledger::Ledger;
use crate::model::{EventClass, NotificationEvent};
use crate::notifier::{MessageFormatter, Notifier};
use crate::source::SourceClient;
use crate::watch::WatchRegistry;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 逐讨论串扫描时同时进行的请求数上限
pub const PER_THREAD_CONCURRENCY: usize = 8;

/// 轮询循环
pub struct PollLoop {
    source: Arc<dyn SourceClient>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<Ledger>,
    watches: WatchRegistry,
    listeners: Listeners,
    formatter: MessageFormatter,
    style: MessageStyle,
    reply_scan: ReplyScan,
    interval: Duration,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn SourceClient>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<Ledger>,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            source,
            notifier,
            ledger,
            watches: WatchRegistry::new(),
            listeners: Listeners::new(),
            formatter: MessageFormatter::from_config(config),
            style: config.message_style,
            reply_scan: config.reply_scan,
            interval: config.poll_interval(),
        }
    }

    /// 设置监听器（构造时确定）
    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// 共享 watch 注册表（只读）
    pub fn with_watches(mut self, watches: WatchRegistry) -> Self {
        self.watches = watches;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 按固定间隔运行，直到收到关闭信号或账本出现致命错误
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PersistenceError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            has_post_listener = self.listeners.has_post_listener(),
            has_reply_listener = self.listeners.has_reply_listener(),
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Poll loop stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// 执行一个 tick：帖子与回复两个子循环并发进行
    pub async fn tick(&self) -> Result<TickReport, PersistenceError> {
        let (posts, replies) = tokio::join!(self.poll_posts_once(), self.poll_replies_once());
        Ok(TickReport {
            posts: posts?,
            replies: replies?,
        })
    }

    /// 帖子子循环
    pub async fn poll_posts_once(&self) -> Result<CycleOutcome, PersistenceError> {
        self.trace_state(EventClass::Post, PollState::Fetching);
        let outcome = match self.source.fetch_latest_post().await {
            Ok(post) => self.reconcile(NotificationEvent::NewPost(post)).await?,
            Err(e) => skip(EventClass::Post, e),
        };
        self.trace_state(EventClass::Post, PollState::Idle);
        Ok(outcome)
    }

    /// 回复子循环
    pub async fn poll_replies_once(&self) -> Result<Vec<CycleOutcome>, PersistenceError> {
        self.trace_state(EventClass::Reply, PollState::Fetching);
        let outcomes = match self.reply_scan {
            ReplyScan::Latest => {
                let outcome = match self.source.fetch_latest_reply().await {
                    Ok(snapshot) => {
                        self.reconcile(NotificationEvent::NewReply {
                            reply: snapshot.reply,
                            thread: snapshot.thread,
                        })
                        .await?
                    }
                    Err(e) => skip(EventClass::Reply, e),
                };
                vec![outcome]
            }
            ReplyScan::PerThread => {
                let thread_ids = self.ledger.posts().ids().await?;
                let mut outcomes = Vec::with_capacity(thread_ids.len());
                let source = &self.source;
                // 并发拉取，按完成顺序对账；一个慢讨论串不拖住其他讨论串
                let mut fetches = stream::iter(thread_ids)
                    .map(|thread_id| async move { source.fetch_thread_replies(&thread_id).await })
                    .buffer_unordered(PER_THREAD_CONCURRENCY);
                while let Some(fetched) = fetches.next().await {
                    let outcome = match fetched {
                        Ok(snapshot) => {
                            self.reconcile(NotificationEvent::NewReply {
                                reply: snapshot.reply,
                                thread: snapshot.thread,
                            })
                            .await?
                        }
                        Err(e) => skip(EventClass::Reply, e),
                    };
                    outcomes.push(outcome);
                }
                outcomes
            }
        };
        self.trace_state(EventClass::Reply, PollState::Idle);
        Ok(outcomes)
    }

    /// 对账并路由一个事件
    pub async fn reconcile(
        &self,
        event: NotificationEvent,
    ) -> Result<CycleOutcome, PersistenceError> {
        let class = event.class();
        let id = event.id().to_string();
        let store = self.ledger.store(class);

        self.trace_state(class, PollState::Reconciling);
        if store.contains(&id).await? {
            debug!(class = %class, id = %id, "Already notified");
            return Ok(CycleOutcome::AlreadySeen { id });
        }

        if let NotificationEvent::NewReply { reply, .. } = &event {
            if self.watches.is_watching(&reply.parent_thread_id) {
                debug!(
                    id = %id,
                    thread_id = %reply.parent_thread_id,
                    "Thread is watched, leaving reply to its watch loop"
                );
                return Ok(CycleOutcome::Suppressed {
                    id,
                    thread_id: reply.parent_thread_id.clone(),
                });
            }
        }

        if let Some(listener) = self.listeners.for_class(class) {
            self.trace_state(class, PollState::Delivering);
            listener(&event);
            self.trace_state(class, PollState::Committing);
            store.add(&id).await?;
            info!(class = %class, id = %id, "Event emitted to listener");
            return Ok(CycleOutcome::Listener { id });
        }

        self.trace_state(class, PollState::Delivering);
        let result = self.deliver(&event).await;

        self.trace_state(class, PollState::Committing);
        store.add(&id).await?;

        match result {
            Ok(()) => {
                info!(class = %class, id = %id, notifier = self.notifier.name(), "Notification delivered");
                Ok(CycleOutcome::Delivered { id })
            }
            Err(e) => {
                warn!(
                    class = %class,
                    id = %id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Delivery failed, committed anyway"
                );
                Ok(CycleOutcome::DeliveryFailed {
                    id,
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                })
            }
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        match self.style {
            MessageStyle::Text => self.notifier.send(&self.formatter.render_text(event)).await,
            MessageStyle::Embed => {
                self.notifier
                    .send_rich(&self.formatter.render_rich(event))
                    .await
            }
        }
    }

    fn trace_state(&self, class: EventClass, state: PollState) {
        debug!(class = %class, state = state.as_str(), "Poll state");
    }
}

/// 拉取失败只跳过本轮
fn skip(class: EventClass, error: FetchError) -> CycleOutcome {
    match &error {
        FetchError::InvalidResponse(_) => {
            warn!(class = %class, error = %error, "Invalid upstream response, skipping tick")
        }
        FetchError::Network(_) => {
            warn!(class = %class, error = %error, "Upstream unreachable, skipping tick")
        }
        FetchError::NotFound(_) => {
            debug!(class = %class, error = %error, "Nothing to fetch this tick")
        }
    }
    CycleOutcome::Skipped {
        reason: error.to_string(),
    }
}
