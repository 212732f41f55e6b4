//! poetsync 命令行入口

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use poetsync::catalog::{CatalogItem, CatalogModel, HttpDownloader};
use poetsync::config::{default_config_path, SyncConfig};
use poetsync::database::dao::PoetDao;
use poetsync::database::{open_database, PoetStore, SqlitePoetStore};
use poetsync::installer::ScriptInstaller;
use poetsync::logger::init_logging;

/// 日志级别
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "poetsync", about = "Poet content catalog sync", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// 配置文件路径
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别（覆盖配置文件）
    #[clap(long, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 刷新并列出远程目录
    List {
        /// 以 JSON 输出
        #[clap(long)]
        json: bool,
    },
    /// 下载并安装诗人
    Install { poet_id: i64 },
    /// 卸载诗人
    Remove { poet_id: i64 },
    /// 列出本地已安装的诗人
    Installed,
}

struct App {
    config: SyncConfig,
    store: Arc<SqlitePoetStore>,
}

impl App {
    fn open(config: SyncConfig) -> Result<Self> {
        let db_path = config.database_path()?;
        let db = open_database(&db_path)
            .with_context(|| format!("无法打开数据库: {}", db_path.display()))?;
        let store = Arc::new(SqlitePoetStore::new(db)?);
        Ok(Self { config, store })
    }

    fn model(&self) -> Result<CatalogModel> {
        let db_path = self.config.database_path()?;
        let temp_dir = self.config.temp_dir()?;
        let downloader = HttpDownloader::new(&self.config.download)?;
        let installer = ScriptInstaller::new(db_path, temp_dir.clone());

        Ok(CatalogModel::new(
            self.config.catalog.clone(),
            temp_dir,
            self.store.clone(),
            Arc::new(downloader),
            installer,
        )?)
    }

    /// 刷新目录并等待结束
    async fn refreshed_model(&self) -> Result<CatalogModel> {
        let mut model = self.model()?;
        model.refresh();
        model.run_until_idle().await;
        for error in model.errors() {
            tracing::warn!("刷新目录失败: {}", error);
        }
        Ok(model)
    }

    async fn list(&self, json: bool) -> Result<()> {
        let model = self.refreshed_model().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(model.items())?);
            return Ok(());
        }

        if !model.name().is_empty() {
            println!("{}", model.name());
        }
        for item in model.items() {
            println!("{}", format_row(item));
        }
        Ok(())
    }

    async fn install(&self, poet_id: i64) -> Result<()> {
        let mut model = self.refreshed_model().await?;
        let guid = model
            .item_for_poet(poet_id)
            .filter(|item| !item.is_local())
            .map(|item| item.guid.clone())
            .ok_or_else(|| anyhow!("目录中没有诗人 {}", poet_id))?;

        if !model.request_download(&guid) {
            return Err(anyhow!("诗人 {} 当前无法下载", poet_id));
        }
        model.run_until_idle().await;

        let item = model
            .item_for_poet(poet_id)
            .ok_or_else(|| anyhow!("诗人 {} 已不在目录中", poet_id))?;
        if !item.status.installed {
            return Err(anyhow!("诗人 {} 安装失败", poet_id));
        }
        println!("{}", format_row(item));
        Ok(())
    }

    async fn remove(&self, poet_id: i64) -> Result<()> {
        if !self.store.contains_poet(poet_id) {
            return Err(anyhow!("诗人 {} 未安装", poet_id));
        }

        let mut model = self.refreshed_model().await?;
        let guid = model
            .item_for_poet(poet_id)
            .map(|item| item.guid.clone())
            .ok_or_else(|| anyhow!("找不到诗人 {}", poet_id))?;

        if !model.request_removal(&guid) {
            return Err(anyhow!("诗人 {} 当前无法卸载", poet_id));
        }
        model.run_until_idle().await;

        if self.store.contains_poet(poet_id) {
            return Err(anyhow!("诗人 {} 卸载失败", poet_id));
        }
        println!("已卸载诗人 {}", poet_id);
        Ok(())
    }

    fn installed(&self) -> Result<()> {
        let conn = self
            .store
            .connection()
            .lock()
            .map_err(|_| anyhow!("数据库锁已损坏"))?;
        for poet in PoetDao::list(&conn)? {
            let last_update = poet
                .last_update
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>6}  {:<24}  {}", poet.id, poet.name, last_update);
        }
        Ok(())
    }
}

fn format_row(item: &CatalogItem) -> String {
    let state = if item.status.update_available {
        "update"
    } else if item.status.installed {
        "installed"
    } else {
        "-"
    };
    let date = item
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>6}  {:<24}  {:<10}  {:<10}  {}",
        item.poet_id, item.name, state, date, item.guid
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = SyncConfig::load(&config_path)
        .with_context(|| format!("无法加载配置: {}", config_path.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.to_filter_directive().to_string();
    }

    let log_dir = config.log_dir().ok();
    init_logging(&config.logging, log_dir.as_deref());
    tracing::debug!("使用配置: {}", config_path.display());

    let app = App::open(config)?;
    match cli.command {
        Command::List { json } => app.list(json).await,
        Command::Install { poet_id } => app.install(poet_id).await,
        Command::Remove { poet_id } => app.remove(poet_id).await,
        Command::Installed => app.installed(),
    }
}
