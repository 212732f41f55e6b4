//! 安装器类型定义
//!
//! 定义安装错误、包格式、安装任务与完成事件

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

/// 安装错误类型
///
/// 单条语句执行失败不属于安装错误，只会记录日志
#[derive(Error, Debug)]
pub enum InstallError {
    /// 解压失败
    #[error("解压失败: {0}")]
    ExtractFailed(String),

    /// 包格式无效
    #[error("包格式无效: {0}")]
    InvalidPackage(String),

    /// 内容包中缺少脚本文件
    #[error("内容包中缺少脚本文件: {0}")]
    ScriptMissing(String),

    /// 安装队列已停止
    #[error("安装队列已停止")]
    QueueClosed,

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

/// 包格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// ZIP 格式
    Zip,
    /// tar.gz 格式
    TarGz,
    /// 7z 格式
    SevenZ,
}

impl PackageFormat {
    /// 从文件头魔数检测格式
    ///
    /// 下载文件的扩展名来自清单，不可靠，因此只看内容
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        match header {
            // PK\x03\x04 (正常文件) 或 PK\x05\x06 (空压缩包)
            [0x50, 0x4B, ..] => Some(PackageFormat::Zip),
            [0x1f, 0x8b, ..] => Some(PackageFormat::TarGz),
            [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, ..] => Some(PackageFormat::SevenZ),
            _ => None,
        }
    }
}

/// 单次脚本执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// 执行成功的语句数
    pub executed: usize,
    /// 执行失败（已记录日志）的语句数
    pub failed: usize,
    /// 安装前清理掉的旧数据行数
    pub purged_rows: usize,
}

/// 安装队列任务
#[derive(Debug, Clone, PartialEq)]
pub enum InstallJob {
    Install {
        file_path: PathBuf,
        guid: String,
        poet_id: i64,
        date: Option<NaiveDateTime>,
    },
    Remove {
        guid: String,
        poet_id: i64,
    },
}

impl InstallJob {
    pub fn guid(&self) -> &str {
        match self {
            InstallJob::Install { guid, .. } | InstallJob::Remove { guid, .. } => guid,
        }
    }

    /// 任务无法执行时对应的失败事件
    pub(crate) fn into_failure(self, reason: impl Into<String>) -> InstallEvent {
        match self {
            InstallJob::Install {
                file_path, guid, ..
            } => InstallEvent::InstallFailed {
                file_path,
                guid,
                reason: reason.into(),
            },
            InstallJob::Remove { guid, .. } => InstallEvent::RemoveFailed {
                guid,
                reason: reason.into(),
            },
        }
    }
}

/// 安装队列完成事件
#[derive(Debug, Clone, PartialEq)]
pub enum InstallEvent {
    Installed {
        file_path: PathBuf,
        guid: String,
    },
    InstallFailed {
        file_path: PathBuf,
        guid: String,
        reason: String,
    },
    Removed {
        guid: String,
    },
    RemoveFailed {
        guid: String,
        reason: String,
    },
}

impl InstallEvent {
    pub fn guid(&self) -> &str {
        match self {
            InstallEvent::Installed { guid, .. }
            | InstallEvent::InstallFailed { guid, .. }
            | InstallEvent::Removed { guid }
            | InstallEvent::RemoveFailed { guid, .. } => guid,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            InstallEvent::InstallFailed { .. } | InstallEvent::RemoveFailed { .. }
        )
    }
}

/// 安装事件接收 trait
///
/// 在安装队列的后台线程上调用，实现方需要自行转发到目标线程
pub trait InstallEventSink: Send + Sync {
    fn on_event(&self, event: InstallEvent);
}

/// 函数事件接收实现
///
/// 将闭包包装为 InstallEventSink
pub struct FnEventSink<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    callback: F,
}

impl<F> FnEventSink<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> InstallEventSink for FnEventSink<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    fn on_event(&self, event: InstallEvent) {
        (self.callback)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_format_detection() {
        assert_eq!(
            PackageFormat::from_magic(&[0x50, 0x4B, 0x03, 0x04]),
            Some(PackageFormat::Zip)
        );
        assert_eq!(
            PackageFormat::from_magic(&[0x1f, 0x8b, 0x08, 0x00]),
            Some(PackageFormat::TarGz)
        );
        assert_eq!(
            PackageFormat::from_magic(b"7z\xBC\xAF\x27\x1C\x00\x04"),
            Some(PackageFormat::SevenZ)
        );
        // 魔数不完整
        assert_eq!(PackageFormat::from_magic(b"7z\xBC\xAF"), None);
        assert_eq!(PackageFormat::from_magic(&[]), None);
    }

    #[test]
    fn test_job_failure_event() {
        let job = InstallJob::Install {
            file_path: PathBuf::from("/tmp/a.zip"),
            guid: "g1".to_string(),
            poet_id: 5,
            date: None,
        };
        let event = job.into_failure("boom");
        assert!(event.is_error());
        assert_eq!(event.guid(), "g1");

        let event = InstallJob::Remove {
            guid: "g2".to_string(),
            poet_id: 5,
        }
        .into_failure("boom");
        assert_eq!(
            event,
            InstallEvent::RemoveFailed {
                guid: "g2".to_string(),
                reason: "boom".to_string()
            }
        );
    }
}
