//! 错误类型 - 轮询、投递、持久化各自独立的错误分类
//!
//! 除 `PersistenceError` 外，所有错误都只会让当前 tick 跳过对应的事件类别，
//! 不会终止进程。

use std::path::PathBuf;
use thiserror::Error;

/// 构造参数缺失或非法
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{0}' parameter not supplied")]
    MissingParameter(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 上游 API 拉取失败
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no embedded items in response: {0}")]
    NotFound(String),
}

impl FetchError {
    /// 上游返回了非 JSON 内容，本轮静默跳过即可
    pub fn is_graceful_skip(&self) -> bool {
        matches!(self, FetchError::InvalidResponse(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::InvalidResponse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Webhook 投递失败
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("cannot send an empty message")]
    EmptyMessage,

    #[error("webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("webhook unreachable: {0}")]
    Unreachable(String),
}

impl DeliveryError {
    /// 限流、服务端错误、网络错误可以稍后重试（轮询循环本身不重试已提交的 ID）
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::EmptyMessage => false,
            DeliveryError::Rejected { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Unreachable(_) => true,
        }
    }
}

/// 去重账本读写失败，有限次重试后视为致命错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger {path} is unreadable after {attempts} attempts: {reason}")]
    Corrupt {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("failed to serialize ledger {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 服务级错误：构造失败或轮询任务异常退出
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("poll task failed: {0}")]
    Task(String),
}
