//! Discussions Notifier - 轮询 Fandom 讨论区，把新帖与新回复推送到 Discord Webhook

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod notifier;
pub mod poller;
pub mod service;
pub mod source;
pub mod watch;

#[cfg(test)]
mod test_utils;

pub use config::{MessageStyle, NotifierConfig, ReplyScan};
pub use error::{ConfigError, DeliveryError, FetchError, PersistenceError, ServiceError};
pub use ledger::{Ledger, LedgerStore};
pub use model::{Author, EventClass, NotificationEvent, Post, Reply, ReplySnapshot, ThreadContext};
pub use notifier::{DiscordWebhook, MessageFormatter, Notifier, StructuredMessage, WebhookConfig};
pub use poller::{CycleOutcome, EventListener, Listeners, PollLoop, PollState, TickReport};
pub use service::{DiscussionsNotifier, DiscussionsNotifierBuilder, ServiceHandle};
pub use source::{FandomClient, SourceClient};
pub use watch::{WatchCallback, WatchHandle, WatchRegistry};
