//! 目录模块
//!
//! 负责远程目录的同步：
//! - 下载并解析清单，与本地已安装诗人合并
//! - 按波斯字母顺序排序，以差异通知发布列表
//! - 管理每个条目的下载、安装与卸载状态

pub mod collation;
pub mod diff;
pub mod downloader;
pub mod manifest;
pub mod model;
pub mod types;

pub use collation::{compare_names, sort_items};
pub use diff::ListDelta;
pub use downloader::{DownloadError, Downloader, HttpDownloader};
pub use manifest::{parse_manifest, Manifest, ManifestError};
pub use model::{CatalogEvent, CatalogModel, DownloadEventKind};
pub use types::{
    CatalogItem, ContentKind, FnObserver, ItemField, ItemStatus, ModelNotification,
    ModelObserver, NoopObserver, INSTALLED_FLAG, UPDATE_AVAILABLE_FLAG,
};
