//! Fandom 讨论区 HTTP 客户端
//!
//! wiki 数字 ID 通过 `api.php` siteinfo 查询一次后缓存；查询失败只影响当前 tick。

use super::parse;
use super::SourceClient;
use crate::config::NotifierConfig;
use crate::error::{ConfigError, FetchError};
use crate::model::{Post, ReplySnapshot};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Fandom 讨论区客户端
#[derive(Debug)]
pub struct FandomClient {
    client: Client,
    server: String,
    site_url: String,
    services_url: String,
    wiki_id: OnceCell<String>,
}

impl FandomClient {
    pub fn new(config: &NotifierConfig) -> Result<Self, ConfigError> {
        Self::with_urls(
            &config.server,
            config.site_url(),
            config.services_base_url.clone(),
            config.request_timeout(),
        )
    }

    /// 自定义站点 / 服务 URL
    pub fn with_urls(
        server: &str,
        site_url: String,
        services_url: String,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("discussions-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "source",
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            server: server.to_string(),
            site_url: site_url.trim_end_matches('/').to_string(),
            services_url: services_url.trim_end_matches('/').to_string(),
            wiki_id: OnceCell::new(),
        })
    }

    /// 已知 wiki ID 时跳过 siteinfo 查询
    pub fn with_wiki_id(self, wiki_id: impl Into<String>) -> Self {
        Self {
            wiki_id: OnceCell::new_with(Some(wiki_id.into())),
            ..self
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// 获取（必要时查询）wiki 数字 ID
    pub async fn wiki_id(&self) -> Result<&str, FetchError> {
        let id = self
            .wiki_id
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/api.php?action=query&format=json&meta=siteinfo&siprop=wikidesc",
                    self.site_url
                );
                let body = self.get_text(&url).await?;
                let id = parse::parse_wiki_id(&body)?;
                info!(server = %self.server, wiki_id = %id, "Resolved wiki id");
                Ok::<String, FetchError>(id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn discussion_url(&self, path: &str) -> Result<String, FetchError> {
        let wiki_id = self.wiki_id().await?;
        Ok(format!("{}/discussion/{}/{}", self.services_url, wiki_id, path))
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(format!("{} returned 404", url)));
        }
        if !status.is_success() {
            return Err(FetchError::InvalidResponse(format!("HTTP {} from {}", status, url)));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SourceClient for FandomClient {
    async fn fetch_latest_post(&self) -> Result<Post, FetchError> {
        let url = self.discussion_url("threads/").await?;
        let body = self.get_text(&url).await?;
        parse::parse_latest_post(&body)
    }

    async fn fetch_latest_reply(&self) -> Result<ReplySnapshot, FetchError> {
        let url = self.discussion_url("posts?limit=1&responseGroup=small").await?;
        let body = self.get_text(&url).await?;
        parse::parse_latest_reply(&body)
    }

    async fn fetch_thread_replies(&self, thread_id: &str) -> Result<ReplySnapshot, FetchError> {
        let url = self
            .discussion_url(&format!(
                "threads/{}?responseGroup=full&show=all&limit=1",
                thread_id
            ))
            .await?;
        let body = self.get_text(&url).await?;
        parse::parse_thread_reply(&body, thread_id)
    }
}
