//! 账本存储 - 本地 JSON 数组文件读写
//!
//! 每次检查都完整读取文件，每次追加都完整重写（临时文件 + 原子替换）。
//! 同一文件的读写通过异步互斥锁串行化，跨进程由 fs2 文件锁保护。

use crate::error::PersistenceError;
use crate::model::id_from_value;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// 单个账本文件
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    guard: Mutex<()>,
    read_retries: u32,
    retry_delay: Duration,
}

impl LedgerStore {
    /// 打开账本，文件不存在时初始化为空数组
    pub fn open(
        path: impl Into<PathBuf>,
        read_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, PersistenceError> {
        let store = Self {
            path: path.into(),
            guard: Mutex::new(()),
            read_retries: read_retries.max(1),
            retry_delay,
        };

        if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent).map_err(|source| store.io_error(source))?;
        }
        if !store.path.exists() {
            store.write_all(&[])?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 是否已记录该 ID
    pub async fn contains(&self, id: &str) -> Result<bool, PersistenceError> {
        let _guard = self.guard.lock().await;
        let ids = self.read_with_retry().await?;
        Ok(ids.iter().any(|existing| existing == id))
    }

    /// 追加 ID。已存在时不重复写入，返回 `false`
    pub async fn add(&self, id: &str) -> Result<bool, PersistenceError> {
        use fs2::FileExt;

        let _guard = self.guard.lock().await;

        let lock_file = self.open_lock_file()?;
        lock_file
            .lock_exclusive()
            .map_err(|source| self.io_error(source))?;

        let result = self.append_locked(id).await;

        if let Err(e) = lock_file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release ledger lock");
        }

        if let Ok(true) = result {
            debug!(path = %self.path.display(), id = %id, "Ledger entry appended");
        }
        result
    }

    async fn append_locked(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut ids = self.read_with_retry().await?;
        if ids.iter().any(|existing| existing == id) {
            return Ok(false);
        }
        ids.push(id.to_string());
        self.write_with_retry(&ids).await?;
        Ok(true)
    }

    /// 只读查看账本文件：不创建目录或文件，不加锁，文件不存在视为空账本
    pub fn peek(path: &Path) -> Result<Vec<String>, PersistenceError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        parse_ids(&content).map_err(|reason| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            attempts: 1,
            reason,
        })
    }

    /// 按写入顺序返回全部 ID
    pub async fn ids(&self) -> Result<Vec<String>, PersistenceError> {
        let _guard = self.guard.lock().await;
        self.read_with_retry().await
    }

    /// 有限次重读，仍失败则上报致命错误
    async fn read_with_retry(&self) -> Result<Vec<String>, PersistenceError> {
        let mut last = None;

        for attempt in 1..=self.read_retries {
            let failure = match self.read_once() {
                Ok(ids) => return Ok(ids),
                Err(ReadFailure::Fatal(e)) => return Err(e),
                Err(failure) => failure,
            };
            warn!(
                path = %self.path.display(),
                attempt,
                max_attempts = self.read_retries,
                reason = %failure,
                "Ledger unreadable, retrying"
            );
            last = Some(failure);
            if attempt < self.read_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(path = %self.path.display(), "Ledger unreadable, giving up");
        Err(match last {
            Some(ReadFailure::Io(e)) | Some(ReadFailure::Fatal(e)) => e,
            Some(ReadFailure::Unparseable(reason)) => PersistenceError::Corrupt {
                path: self.path.clone(),
                attempts: self.read_retries,
                reason,
            },
            None => PersistenceError::Corrupt {
                path: self.path.clone(),
                attempts: 0,
                reason: "no read attempted".to_string(),
            },
        })
    }

    /// 有限次重写，仍失败则上报最后一次 I/O 错误
    async fn write_with_retry(&self, ids: &[String]) -> Result<(), PersistenceError> {
        let mut attempt = 1;
        loop {
            match self.write_all(ids) {
                Ok(()) => return Ok(()),
                Err(e @ PersistenceError::Io { .. }) if attempt < self.read_retries => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        max_attempts = self.read_retries,
                        error = %e,
                        "Ledger unwritable, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Ledger unwritable, giving up");
                    return Err(e);
                }
            }
        }
    }

    fn read_once(&self) -> Result<Vec<String>, ReadFailure> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Ledger missing, initializing empty");
                self.write_all(&[]).map_err(ReadFailure::from_write)?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(ReadFailure::Io(self.io_error(e))),
        };

        parse_ids(&content).map_err(ReadFailure::Unparseable)
    }

    fn write_all(&self, ids: &[String]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(ids).map_err(|source| PersistenceError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(|source| self.io_error(source))?;
        fs::rename(&temp_path, &self.path).map_err(|source| self.io_error(source))?;
        Ok(())
    }

    fn open_lock_file(&self) -> Result<File, PersistenceError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.with_extension("lock"))
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

enum ReadFailure {
    /// 不可重试（序列化失败）
    Fatal(PersistenceError),
    /// 文件系统错误，可重试
    Io(PersistenceError),
    /// 内容不是 ID 数组，可重试
    Unparseable(String),
}

impl ReadFailure {
    fn from_write(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Io { .. } => ReadFailure::Io(e),
            other => ReadFailure::Fatal(other),
        }
    }
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadFailure::Fatal(e) | ReadFailure::Io(e) => write!(f, "{}", e),
            ReadFailure::Unparseable(reason) => f.write_str(reason),
        }
    }
}

fn parse_ids(content: &str) -> Result<Vec<String>, String> {
    let values: Vec<Value> = serde_json::from_str(content).map_err(|e| e.to_string())?;
    values
        .iter()
        .map(|v| id_from_value(v).ok_or_else(|| format!("unexpected entry {}", v)))
        .collect()
}
