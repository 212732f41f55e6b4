//! 配置管理模块
//!
//! 从 YAML 文件加载同步配置，缺失字段使用默认值

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认目录清单地址
pub const DEFAULT_CATALOG_URL: &str = "http://aseman.land/download/meikade/2/data.xml";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置格式错误: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("无法获取主目录")]
    NoHomeDir,
}

/// 目录清单配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// 清单下载地址
    pub url: String,
    /// 文档类型与根元素名
    pub doc_type: String,
    /// 支持的最低清单版本（按字符串比较）
    pub min_version: String,
    /// 支持的最高数据结构版本
    pub supported_structure: i32,
    /// 修订日期格式
    pub date_format: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            doc_type: "MeikadePoemsXml".to_string(),
            min_version: "1.0".to_string(),
            supported_structure: 1,
            date_format: "%Y/%m/%d-%H:%M:%S".to_string(),
        }
    }
}

/// 路径配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// 数据库路径覆盖
    pub database: Option<PathBuf>,
    /// 旧版数据库路径，存在时优先使用
    pub legacy_database: Option<PathBuf>,
    /// 临时目录
    pub temp_dir: Option<PathBuf>,
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: "PoetSync".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    pub level: String,
    /// 是否写入日志文件
    pub file_logging: bool,
    /// 日志目录
    pub log_dir: Option<PathBuf>,
    /// 轮转文件保留天数
    pub retention_days: u32,
    /// 单个日志文件最大字节数
    pub max_file_size: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            log_dir: None,
            retention_days: 7,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// 同步配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub catalog: CatalogConfig,
    pub paths: PathsConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// 从文件加载配置，文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("[配置] 配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// 从默认位置加载配置
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_config_path()?)
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 本地数据库路径
    ///
    /// 优先级：旧版路径（存在时） > 配置覆盖 > 默认数据目录
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(legacy) = &self.paths.legacy_database {
            if legacy.exists() {
                return Ok(legacy.clone());
            }
        }
        if let Some(path) = &self.paths.database {
            return Ok(path.clone());
        }
        Ok(data_dir()?.join("data.sqlite"))
    }

    /// 临时目录
    pub fn temp_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.temp_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("tmp")),
        }
    }

    /// 日志目录
    pub fn log_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.logging.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("logs")),
        }
    }
}

/// 默认配置文件路径: <config dir>/poetsync/config.yaml
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|p| p.join("poetsync").join("config.yaml"))
        .ok_or(ConfigError::NoHomeDir)
}

fn data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join("poetsync"))
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.catalog.supported_structure, 1);
        assert_eq!(config.catalog.min_version, "1.0");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "catalog:\n  url: http://localhost/data.xml\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.catalog.url, "http://localhost/data.xml");
        assert_eq!(config.catalog.doc_type, "MeikadePoemsXml");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.retention_days, 7);
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "catalog: [unclosed").unwrap();

        assert!(matches!(SyncConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = SyncConfig::default();
        config.paths.database = Some(dir.path().join("poems.sqlite"));
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_legacy_database_preferred_when_present() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("old.sqlite");
        let modern = dir.path().join("new.sqlite");

        let mut config = SyncConfig::default();
        config.paths.legacy_database = Some(legacy.clone());
        config.paths.database = Some(modern.clone());
        assert_eq!(config.database_path().unwrap(), modern);

        std::fs::write(&legacy, b"").unwrap();
        assert_eq!(config.database_path().unwrap(), legacy);
    }
}
