//! 内容包安装模块
//!
//! 提供诗人内容包的安装与卸载：
//! - 内容包解压（7z / ZIP / tar.gz）
//! - 执行 script.sql 写入本地诗歌库
//! - 后台安装队列，按顺序逐个执行

pub mod extractor;
pub mod queue;
pub mod script;
pub mod types;

pub use extractor::{ArchiveExtractor, Extractor};
pub use queue::InstallQueue;
pub use script::{split_statements, ScriptInstaller, SCRIPT_FILE_NAME};
pub use types::{
    FnEventSink, InstallError, InstallEvent, InstallEventSink, InstallJob, PackageFormat,
    ScriptReport,
};
