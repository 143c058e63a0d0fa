//! 通知服务 - 组装数据源、账本、投递端与轮询循环
//!
//! # 使用示例
//! ```ignore
//! use discussions_notifier::DiscussionsNotifier;
//!
//! let service = DiscussionsNotifier::builder("community", "1234", "token")
//!     .on_new_post(|event| println!("new post {}", event.id()))
//!     .build()?;
//!
//! let _watch = service.watch_thread("4400000000000012345", |reply, _raw| {
//!     println!("reply {} by {}", reply.id, reply.created_by.name);
//! });
//! let handle = service.start();
//! // ...
//! handle.shutdown().await?;
//! ```

use crate::config::{MessageStyle, NotifierConfig, ReplyScan};
use crate::error::{DeliveryError, PersistenceError, ServiceError};
use crate::ledger::Ledger;
use crate::model::{NotificationEvent, Reply};
use crate::notifier::{DiscordWebhook, Notifier, WebhookConfig};
use crate::poller::{Listeners, PollLoop, TickReport};
use crate::source::{FandomClient, SourceClient};
use crate::watch::{run_watch, WatchCallback, WatchHandle, WatchRegistry};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// 服务构建器
pub struct DiscussionsNotifierBuilder {
    config: NotifierConfig,
    listeners: Listeners,
    source: Option<Arc<dyn SourceClient>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl DiscussionsNotifierBuilder {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            listeners: Listeners::new(),
            source: None,
            notifier: None,
        }
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn message_style(mut self, style: MessageStyle) -> Self {
        self.config.message_style = style;
        self
    }

    pub fn reply_scan(mut self, scan: ReplyScan) -> Self {
        self.config.reply_scan = scan;
        self
    }

    pub fn default_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.config.default_avatar_url = url.into();
        self
    }

    /// 订阅新帖事件，注册后新帖不再发往 Webhook
    pub fn on_new_post<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.listeners = self.listeners.on_new_post(listener);
        self
    }

    /// 订阅新回复事件，注册后新回复不再发往 Webhook
    pub fn on_new_reply<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.listeners = self.listeners.on_new_reply(listener);
        self
    }

    /// 替换数据源（测试或自定义上游）
    pub fn source(mut self, source: Arc<dyn SourceClient>) -> Self {
        self.source = Some(source);
        self
    }

    /// 替换投递端
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 校验配置、打开账本、组装轮询循环
    pub fn build(self) -> Result<DiscussionsNotifier, ServiceError> {
        self.config.validate()?;

        let source: Arc<dyn SourceClient> = match self.source {
            Some(source) => source,
            None => Arc::new(FandomClient::new(&self.config)?),
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(DiscordWebhook::new(WebhookConfig::from(&self.config))?),
        };
        let ledger = Arc::new(Ledger::from_config(&self.config)?);
        let watches = WatchRegistry::new();

        let poll = PollLoop::new(
            Arc::clone(&source),
            Arc::clone(&notifier),
            Arc::clone(&ledger),
            &self.config,
        )
        .with_listeners(self.listeners)
        .with_watches(watches.clone());

        let (shutdown, _) = watch::channel(false);

        info!(
            server = %self.config.server,
            data_dir = %self.config.data_dir.display(),
            "Discussions notifier configured"
        );

        Ok(DiscussionsNotifier {
            config: self.config,
            source,
            notifier,
            ledger,
            watches,
            poll: Arc::new(poll),
            shutdown: Arc::new(shutdown),
        })
    }
}

/// 讨论区通知服务
pub struct DiscussionsNotifier {
    config: NotifierConfig,
    source: Arc<dyn SourceClient>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<Ledger>,
    watches: WatchRegistry,
    poll: Arc<PollLoop>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl DiscussionsNotifier {
    /// 以三个必需参数开始构建
    pub fn builder(
        server: impl Into<String>,
        webhook_id: impl Into<String>,
        webhook_token: impl Into<String>,
    ) -> DiscussionsNotifierBuilder {
        DiscussionsNotifierBuilder::new(NotifierConfig::new(server, webhook_id, webhook_token))
    }

    /// 以完整配置开始构建
    pub fn from_config(config: NotifierConfig) -> DiscussionsNotifierBuilder {
        DiscussionsNotifierBuilder::new(config)
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// 启动轮询循环（需要在 tokio runtime 中调用）
    pub fn start(&self) -> ServiceHandle {
        let poll = Arc::clone(&self.poll);
        let rx = self.shutdown.subscribe();
        let task = tokio::spawn(async move { poll.run(rx).await });

        ServiceHandle {
            task,
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// 手动执行一个 tick
    pub async fn tick(&self) -> Result<TickReport, PersistenceError> {
        self.poll.tick().await
    }

    /// 监听讨论串：其回复只交给 `callback`，不再走默认通知路径
    ///
    /// 同一讨论串可以有多个订阅者，它们共用一个子循环，每条新回复都会交给全部订阅者。
    /// 返回的句柄被 cancel 或 drop 时取消订阅（需要在 tokio runtime 中调用）。
    pub fn watch_thread<F>(&self, thread_id: impl Into<String>, callback: F) -> WatchHandle
    where
        F: Fn(&Reply, &Value) + Send + Sync + 'static,
    {
        let thread_id = thread_id.into();
        let callback: WatchCallback = Arc::new(callback);
        let (subscription, needs_loop) = self.watches.subscribe(&thread_id, callback);

        if needs_loop {
            let task = tokio::spawn(run_watch(
                Arc::clone(&self.source),
                Arc::clone(&self.ledger),
                self.watches.clone(),
                thread_id.clone(),
                self.config.poll_interval(),
                self.shutdown.subscribe(),
            ));
            self.watches.attach_task(&thread_id, task);
            info!(thread_id = %thread_id, "Watching thread");
        } else {
            info!(
                thread_id = %thread_id,
                subscribers = self.watches.subscriber_count(&thread_id),
                "Added subscriber to watched thread"
            );
        }

        WatchHandle::new(thread_id, subscription, self.watches.clone())
    }

    /// 直接发送一条文本消息
    pub async fn send_message(&self, content: &str) -> Result<(), DeliveryError> {
        self.notifier.send(content).await
    }
}

/// 运行中的轮询任务句柄
#[derive(Debug)]
pub struct ServiceHandle {
    task: JoinHandle<Result<(), PersistenceError>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServiceHandle {
    /// 等待轮询任务结束（只有账本致命错误或关闭才会结束）
    pub async fn wait(&mut self) -> Result<(), ServiceError> {
        match (&mut self.task).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(e) => Err(ServiceError::Task(e.to_string())),
        }
    }

    /// 通知轮询循环和所有 watch 子循环停止，并等待轮询任务退出
    pub async fn shutdown(mut self) -> Result<(), ServiceError> {
        // 所有接收端都已退出时 send 会失败，此时任务已经结束
        let _ = self.shutdown.send(true);
        if self.task.is_finished() {
            info!("Poll task already finished");
        }
        self.wait().await
    }
}
