//! 配置模块
//!
//! 配置读取优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 配置文件 `~/.config/discussions-notifier/config.json`
//! 3. 环境变量 `DN_SERVER` / `DN_WEBHOOK_ID` / `DN_WEBHOOK_TOKEN` / `DN_POLL_INTERVAL` / `DN_DATA_DIR`
//! 4. 命令行参数（由 `main.rs` 处理）

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 默认轮询间隔（秒）
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Fandom 默认头像
pub const DEFAULT_AVATAR_URL: &str =
    "https://static.wikia.nocookie.net/messaging/images/1/19/Avatar.jpg";

/// Discord Webhook API 基础 URL
pub const DEFAULT_WEBHOOK_BASE_URL: &str = "https://discord.com/api/webhooks";

/// Fandom 讨论服务基础 URL
pub const DEFAULT_SERVICES_BASE_URL: &str = "https://services.fandom.com";

/// wiki 站点 URL 模板，`{server}` 会被替换为服务器标识
pub const DEFAULT_SITE_URL_TEMPLATE: &str = "https://{server}.fandom.com";

/// 通知消息样式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStyle {
    /// 纯文本 markdown 消息 `{content}`
    Text,
    /// 富文本 embed `{embeds: [...]}`
    #[default]
    Embed,
}

impl std::str::FromStr for MessageStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(MessageStyle::Text),
            "embed" => Ok(MessageStyle::Embed),
            other => Err(format!("unknown message style: {}", other)),
        }
    }
}

/// 回复检测方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyScan {
    /// 每个 tick 拉取全站最新一条回复
    #[default]
    Latest,
    /// 每个 tick 逐个扫描已记录帖子的最新回复
    PerThread,
}

/// 通知服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// wiki 服务器标识（如 `community`）
    pub server: String,
    /// Webhook ID
    pub webhook_id: String,
    /// Webhook token
    pub webhook_token: String,
    /// 轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 账本文件所在目录
    pub data_dir: PathBuf,
    /// 作者无头像时使用的默认头像
    pub default_avatar_url: String,
    pub message_style: MessageStyle,
    pub reply_scan: ReplyScan,
    /// HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 账本读写失败时的最大尝试次数
    pub ledger_read_retries: u32,
    /// 账本重试间隔（毫秒）
    pub ledger_retry_delay_ms: u64,
    pub webhook_base_url: String,
    pub services_base_url: String,
    pub site_url_template: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            webhook_id: String::new(),
            webhook_token: String::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            data_dir: Self::default_dir(),
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
            message_style: MessageStyle::default(),
            reply_scan: ReplyScan::default(),
            request_timeout_secs: 30,
            ledger_read_retries: 3,
            ledger_retry_delay_ms: 200,
            webhook_base_url: DEFAULT_WEBHOOK_BASE_URL.to_string(),
            services_base_url: DEFAULT_SERVICES_BASE_URL.to_string(),
            site_url_template: DEFAULT_SITE_URL_TEMPLATE.to_string(),
        }
    }
}

impl NotifierConfig {
    /// 使用三个必需参数创建配置，其余取默认值
    pub fn new(
        server: impl Into<String>,
        webhook_id: impl Into<String>,
        webhook_token: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            webhook_id: webhook_id.into(),
            webhook_token: webhook_token.into(),
            ..Default::default()
        }
    }

    /// 默认配置目录 `~/.config/discussions-notifier`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("discussions-notifier")
    }

    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.json")
    }

    /// 从默认配置文件和环境变量加载
    pub fn auto_load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::default_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 读取 JSON 配置文件，文件不存在时返回默认配置
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 应用环境变量覆盖。`lookup` 便于测试时替换环境
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("DN_SERVER") {
            self.server = v;
        }
        if let Some(v) = non_empty("DN_WEBHOOK_ID") {
            self.webhook_id = v;
        }
        if let Some(v) = non_empty("DN_WEBHOOK_TOKEN") {
            self.webhook_token = v;
        }
        if let Some(secs) = non_empty("DN_POLL_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.poll_interval_secs = secs;
        }
        if let Some(dir) = non_empty("DN_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// 校验必需参数
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::MissingParameter("server"));
        }
        if self.webhook_id.trim().is_empty() {
            return Err(ConfigError::MissingParameter("id"));
        }
        if self.webhook_token.trim().is_empty() {
            return Err(ConfigError::MissingParameter("token"));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.ledger_read_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ledger_read_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ledger_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ledger_retry_delay_ms)
    }

    /// wiki 站点根 URL，如 `https://community.fandom.com`
    pub fn site_url(&self) -> String {
        self.site_url_template.replace("{server}", &self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = NotifierConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.default_avatar_url, DEFAULT_AVATAR_URL);
        assert_eq!(config.message_style, MessageStyle::Embed);
        assert_eq!(config.reply_scan, ReplyScan::Latest);
        assert!(config.data_dir.ends_with("discussions-notifier"));
    }

    #[test]
    fn test_validate_reports_missing_parameters_in_order() {
        let config = NotifierConfig::new("", "id", "token");
        assert!(matches!(config.validate(), Err(ConfigError::MissingParameter("server"))));

        let config = NotifierConfig::new("community", "", "token");
        assert!(matches!(config.validate(), Err(ConfigError::MissingParameter("id"))));

        let config = NotifierConfig::new("community", "id", " ");
        assert!(matches!(config.validate(), Err(ConfigError::MissingParameter("token"))));

        assert!(NotifierConfig::new("community", "id", "token").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = NotifierConfig::new("community", "id", "token");
        config.poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "poll_interval_secs", .. })
        ));
    }

    #[test]
    fn test_load_file_missing_returns_default() {
        let dir = tempdir().unwrap();
        let config = NotifierConfig::load_file(&dir.path().join("nope.json")).unwrap();
        assert!(config.server.is_empty());
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_load_file_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"server": "community", "poll_interval_secs": 10, "message_style": "text"}"#,
        )
        .unwrap();

        let config = NotifierConfig::load_file(&path).unwrap();
        assert_eq!(config.server, "community");
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.message_style, MessageStyle::Text);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_file_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            NotifierConfig::load_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DN_SERVER", "dev"),
            ("DN_WEBHOOK_ID", "123"),
            ("DN_WEBHOOK_TOKEN", ""),
            ("DN_POLL_INTERVAL", "15"),
        ]
        .into_iter()
        .collect();

        let mut config = NotifierConfig::new("community", "id", "token");
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server, "dev");
        assert_eq!(config.webhook_id, "123");
        // 空值不覆盖
        assert_eq!(config.webhook_token, "token");
        assert_eq!(config.poll_interval_secs, 15);
    }

    #[test]
    fn test_site_url() {
        let config = NotifierConfig::new("community", "id", "token");
        assert_eq!(config.site_url(), "https://community.fandom.com");
    }

    #[test]
    fn test_message_style_from_str() {
        assert_eq!("TEXT".parse::<MessageStyle>().unwrap(), MessageStyle::Text);
        assert_eq!("embed".parse::<MessageStyle>().unwrap(), MessageStyle::Embed);
        assert!("html".parse::<MessageStyle>().is_err());
    }
}
