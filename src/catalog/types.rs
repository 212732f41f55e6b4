//! 目录类型定义
//!
//! 定义目录条目、条目状态与模型通知

use chrono::NaiveDateTime;
use serde::Serialize;

/// 已安装标志位
pub const INSTALLED_FLAG: i32 = 1 << 19;

/// 有可用更新标志位
pub const UPDATE_AVAILABLE_FLAG: i32 = 1 << 20;

/// 本地合成条目的 guid 前缀
pub const LOCAL_GUID_PREFIX: &str = "local:";

/// 内容类别（清单中 Poet 的 type 属性，不含状态标志位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ContentKind(pub i32);

impl ContentKind {
    /// 从旧版位掩码中拆出内容类别
    pub fn from_mask(mask: i32) -> Self {
        Self(mask & !(INSTALLED_FLAG | UPDATE_AVAILABLE_FLAG))
    }
}

/// 条目运行时状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub downloaded: bool,
    pub downloading: bool,
    pub download_error: bool,
    pub downloaded_bytes: u64,
    pub installing: bool,
    pub installed: bool,
    pub removing: bool,
    pub update_available: bool,
}

/// 目录条目
///
/// 两个条目是否相同只看 guid
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogItem {
    pub poet_id: i64,
    pub name: String,
    pub kind: ContentKind,

    pub guid: String,
    pub date: Option<NaiveDateTime>,
    /// 数据结构版本
    pub structure: i32,
    /// 内容版本
    pub version: i32,

    pub mime_type: String,
    /// 压缩方式，同时用作下载文件扩展名
    pub compress: String,
    pub download_url: String,
    pub thumb_url: String,
    pub file_size: u64,
    pub thumb_size: u64,

    pub status: ItemStatus,
}

impl CatalogItem {
    /// 为本地已安装但不在清单中的诗人合成条目
    pub fn local(poet_id: i64, name: impl Into<String>) -> Self {
        Self {
            poet_id,
            name: name.into(),
            guid: local_guid(poet_id),
            status: ItemStatus {
                installed: true,
                ..ItemStatus::default()
            },
            ..Self::default()
        }
    }

    /// 是否为本地合成条目（没有下载地址）
    pub fn is_local(&self) -> bool {
        self.guid.starts_with(LOCAL_GUID_PREFIX)
    }

    /// 旧版 type 位掩码：内容类别 | 已安装 | 有更新
    pub fn type_mask(&self) -> i32 {
        let mut mask = self.kind.0;
        if self.status.installed {
            mask |= INSTALLED_FLAG;
        }
        if self.status.update_available {
            mask |= UPDATE_AVAILABLE_FLAG;
        }
        mask
    }
}

impl PartialEq for CatalogItem {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for CatalogItem {}

pub fn local_guid(poet_id: i64) -> String {
    format!("{}{}", LOCAL_GUID_PREFIX, poet_id)
}

/// 条目字段，用于 ItemChanged 通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemField {
    Downloading,
    DownloadError,
    DownloadedBytes,
    Installing,
    Installed,
    Removing,
    UpdateAvailable,
}

/// 模型通知
///
/// 每条结构通知发出时，列表已处于该步骤之后的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelNotification {
    RowRemoved {
        index: usize,
    },
    /// `destination` 为按移除前索引计算的目标位置
    RowMoved {
        from: usize,
        to: usize,
        destination: usize,
    },
    RowInserted {
        index: usize,
    },
    CountChanged {
        count: usize,
    },
    ListChanged,
    ItemChanged {
        index: usize,
        fields: Vec<ItemField>,
    },
    RefreshingChanged {
        refreshing: bool,
    },
    ErrorsChanged,
}

impl ModelNotification {
    /// 是否为行结构变化
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ModelNotification::RowRemoved { .. }
                | ModelNotification::RowMoved { .. }
                | ModelNotification::RowInserted { .. }
        )
    }
}

/// 模型观察者 trait
///
/// `items` 为通知发出时的只读列表快照
pub trait ModelObserver: Send + Sync {
    fn on_notification(&self, notification: &ModelNotification, items: &[CatalogItem]);
}

/// 空观察者实现
pub struct NoopObserver;

impl ModelObserver for NoopObserver {
    fn on_notification(&self, _notification: &ModelNotification, _items: &[CatalogItem]) {}
}

/// 函数观察者实现
///
/// 将闭包包装为 ModelObserver
pub struct FnObserver<F>
where
    F: Fn(&ModelNotification, &[CatalogItem]) + Send + Sync,
{
    callback: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&ModelNotification, &[CatalogItem]) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ModelObserver for FnObserver<F>
where
    F: Fn(&ModelNotification, &[CatalogItem]) + Send + Sync,
{
    fn on_notification(&self, notification: &ModelNotification, items: &[CatalogItem]) {
        (self.callback)(notification, items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mask_follows_status() {
        let mut item = CatalogItem {
            kind: ContentKind(3),
            guid: "g1".to_string(),
            ..CatalogItem::default()
        };
        assert_eq!(item.type_mask(), 3);

        item.status.installed = true;
        assert_eq!(item.type_mask(), 3 | INSTALLED_FLAG);

        item.status.update_available = true;
        assert_eq!(item.type_mask(), 3 | INSTALLED_FLAG | UPDATE_AVAILABLE_FLAG);
        assert_eq!(ContentKind::from_mask(item.type_mask()), ContentKind(3));
    }

    #[test]
    fn test_local_item() {
        let item = CatalogItem::local(12, "سعدی");
        assert!(item.is_local());
        assert!(item.status.installed);
        assert_eq!(item.guid, "local:12");
        assert_eq!(item.type_mask(), INSTALLED_FLAG);
    }

    #[test]
    fn test_equality_is_guid_only() {
        let a = CatalogItem {
            guid: "g1".to_string(),
            name: "a".to_string(),
            ..CatalogItem::default()
        };
        let b = CatalogItem {
            guid: "g1".to_string(),
            name: "b".to_string(),
            poet_id: 9,
            ..CatalogItem::default()
        };
        assert_eq!(a, b);
        assert_ne!(a, CatalogItem::local(9, "b"));
    }
}
