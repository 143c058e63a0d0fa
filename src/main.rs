//! Discussions Notifier CLI
//!
//! 轮询 Fandom 讨论区，把新帖与新回复推送到 Discord Webhook

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use discussions_notifier::{
    DiscordWebhook, DiscussionsNotifier, Ledger, MessageStyle, Notifier, NotifierConfig,
    WebhookConfig,
};
use discussions_notifier::ledger::{POST_LEDGER_FILE, REPLY_LEDGER_FILE};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dn")]
#[command(about = "Discussions Notifier - 把 Fandom 讨论区的新帖与新回复推送到 Discord")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动轮询服务，Ctrl+C 退出
    Run(ConnectionArgs),
    /// 通过 Webhook 发送一条文本消息（连通性检查）
    Send {
        /// 消息内容
        message: String,
        #[command(flatten)]
        conn: ConnectionArgs,
    },
    /// 启动轮询服务并监听指定讨论串的回复
    Watch {
        /// 讨论串 ID
        thread_id: String,
        #[command(flatten)]
        conn: ConnectionArgs,
    },
    /// 查看去重账本（只读，不创建文件）
    CheckLedger {
        /// 数据目录
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

/// 覆盖配置文件 / 环境变量的连接参数
#[derive(Args, Debug, Default)]
struct ConnectionArgs {
    /// Fandom 站点子域名
    #[arg(long)]
    server: Option<String>,
    /// Discord Webhook ID
    #[arg(long)]
    webhook_id: Option<String>,
    /// Discord Webhook token
    #[arg(long)]
    webhook_token: Option<String>,
    /// 轮询间隔（秒）
    #[arg(long, short)]
    interval: Option<u64>,
    /// 数据目录（账本文件存放处）
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// 消息样式：text 或 embed
    #[arg(long)]
    style: Option<MessageStyle>,
}

impl ConnectionArgs {
    fn apply(self, config: &mut NotifierConfig) {
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(id) = self.webhook_id {
            config.webhook_id = id;
        }
        if let Some(token) = self.webhook_token {
            config.webhook_token = token;
        }
        if let Some(secs) = self.interval {
            config.poll_interval_secs = secs;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(style) = self.style {
            config.message_style = style;
        }
    }
}

fn load_config(conn: ConnectionArgs) -> Result<NotifierConfig> {
    let mut config = NotifierConfig::auto_load().context("Failed to load config")?;
    conn.apply(&mut config);
    Ok(config)
}

async fn run_until_ctrl_c(service: DiscussionsNotifier) -> Result<()> {
    let mut handle = service.start();
    info!(
        server = %service.config().server,
        interval_secs = service.config().poll_interval_secs,
        "Polling started, press Ctrl+C to stop"
    );

    let finished = tokio::select! {
        result = handle.wait() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(result) => {
            if let Err(e) = &result {
                error!(error = %e, "Poll loop stopped");
            }
            result?;
        }
        None => {
            info!("Shutting down");
            handle.shutdown().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("discussions_notifier=info,dn=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(conn) => {
            let config = load_config(conn)?;
            let service = DiscussionsNotifier::from_config(config).build()?;
            run_until_ctrl_c(service).await?;
        }
        Commands::Send { message, conn } => {
            let config = load_config(conn)?;
            let webhook = DiscordWebhook::new(WebhookConfig::from(&config))?;
            match webhook.send(&message).await {
                Ok(()) => println!("已发送"),
                Err(e) => {
                    eprintln!("发送失败: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Watch { thread_id, conn } => {
            let config = load_config(conn)?;
            let service = DiscussionsNotifier::from_config(config).build()?;
            let _watch = service.watch_thread(thread_id, |reply, _raw| {
                info!(
                    reply_id = %reply.id,
                    thread_id = %reply.parent_thread_id,
                    author = %reply.created_by.name,
                    "New reply on watched thread"
                );
                println!("{}: {}", reply.created_by.name, reply.raw_content);
            });
            run_until_ctrl_c(service).await?;
        }
        Commands::CheckLedger { data_dir, json } => {
            let mut config = NotifierConfig::auto_load().context("Failed to load config")?;
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            let (posts, replies) = Ledger::inspect(&config.data_dir)?;
            let posts_path = config.data_dir.join(POST_LEDGER_FILE);
            let replies_path = config.data_dir.join(REPLY_LEDGER_FILE);

            if json {
                let out = serde_json::json!({
                    "dataDir": config.data_dir,
                    "posts": posts,
                    "replies": replies,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("数据目录: {}", config.data_dir.display());
                println!("帖子账本 ({}): {}", posts.len(), posts_path.display());
                for id in &posts {
                    println!("  {}", id);
                }
                println!("回复账本 ({}): {}", replies.len(), replies_path.display());
                for id in &replies {
                    println!("  {}", id);
                }
            }
        }
    }

    Ok(())
}
