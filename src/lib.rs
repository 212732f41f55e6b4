//! 诗人内容同步核心
//!
//! 从远程目录发现诗人内容包，跟踪下载/安装/卸载状态，
//! 并把安装的内容写入本地诗歌库。

pub mod catalog;
pub mod config;
pub mod database;
pub mod installer;
pub mod logger;

pub use catalog::{CatalogItem, CatalogModel, ModelNotification};
pub use config::SyncConfig;
