//! 目录模型
//!
//! 所有状态变化都在持有模型的任务上进行：
//! 清单下载、内容包下载与安装队列的结果都以 `CatalogEvent` 的形式
//! 送回同一个通道，由 `handle_event` 逐个处理。
//!
//! 列表每次变化都通过差异计算发布为删除/移动/插入通知，
//! 不会整体替换。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::collation::sort_items;
use super::diff::{self, ListDelta};
use super::downloader::{DownloadError, Downloader};
use super::manifest::parse_manifest;
use super::types::{CatalogItem, ItemField, ModelNotification, ModelObserver, NoopObserver};
use crate::config::CatalogConfig;
use crate::database::PoetStore;
use crate::installer::{FnEventSink, InstallError, InstallEvent, InstallQueue, ScriptInstaller};

/// 单个内容包下载任务的事件
#[derive(Debug)]
pub enum DownloadEventKind {
    /// 累计已接收字节数
    Progress(u64),
    Failed(String),
    Finished(PathBuf),
}

/// 模型事件
#[derive(Debug)]
pub enum CatalogEvent {
    ManifestLoaded(Result<Vec<u8>, DownloadError>),
    Download {
        guid: String,
        worker_id: u64,
        kind: DownloadEventKind,
    },
    Install(InstallEvent),
}

struct DownloadWorker {
    id: u64,
    dest: PathBuf,
    handle: JoinHandle<()>,
}

/// 目录模型
pub struct CatalogModel {
    config: CatalogConfig,
    temp_dir: PathBuf,
    store: Arc<dyn PoetStore>,
    downloader: Arc<dyn Downloader>,
    queue: InstallQueue,
    observer: Arc<dyn ModelObserver>,

    events_tx: mpsc::UnboundedSender<CatalogEvent>,
    events_rx: mpsc::UnboundedReceiver<CatalogEvent>,

    items: Vec<CatalogItem>,
    name: String,
    description: String,
    errors: Vec<String>,

    manifest_task: Option<JoinHandle<()>>,
    workers: HashMap<String, DownloadWorker>,
    next_worker_id: u64,
    /// 已交给安装队列、尚未收到结果的任务数
    in_flight_jobs: usize,
}

impl CatalogModel {
    /// 创建模型并启动安装队列
    pub fn new(
        config: CatalogConfig,
        temp_dir: PathBuf,
        store: Arc<dyn PoetStore>,
        downloader: Arc<dyn Downloader>,
        installer: ScriptInstaller,
    ) -> Result<Self, InstallError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let sink_tx = events_tx.clone();
        let sink = FnEventSink::new(move |event: InstallEvent| {
            let _ = sink_tx.send(CatalogEvent::Install(event));
        });
        let queue = InstallQueue::start(installer, Arc::new(sink))?;

        Ok(Self {
            config,
            temp_dir,
            store,
            downloader,
            queue,
            observer: Arc::new(NoopObserver),
            events_tx,
            events_rx,
            items: Vec::new(),
            name: String::new(),
            description: String::new(),
            errors: Vec::new(),
            manifest_task: None,
            workers: HashMap::new(),
            next_worker_id: 0,
            in_flight_jobs: 0,
        })
    }

    pub fn set_observer(&mut self, observer: Arc<dyn ModelObserver>) {
        self.observer = observer;
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&CatalogItem> {
        self.items.get(index)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn index_of(&self, guid: &str) -> Option<usize> {
        self.items.iter().position(|item| item.guid == guid)
    }

    pub fn contains_poet(&self, poet_id: i64) -> bool {
        self.items.iter().any(|item| item.poet_id == poet_id)
    }

    /// 按诗人 ID 查找条目
    pub fn item_for_poet(&self, poet_id: i64) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.poet_id == poet_id)
    }

    /// 清单名称
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 最近一次刷新失败的原因
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn refreshing(&self) -> bool {
        self.manifest_task.is_some()
    }

    /// 是否有下载任务或安装任务未完成
    pub fn processing(&self) -> bool {
        !self.workers.is_empty() || self.in_flight_jobs > 0 || self.queue.is_active()
    }

    /// 刷新目录
    ///
    /// 先发布本地已安装的诗人，再下载清单
    pub fn refresh(&mut self) {
        if self.processing() || self.refreshing() {
            tracing::debug!("[目录] 正在处理中，忽略刷新请求");
            return;
        }

        self.publish(Vec::new());
        self.load_installed();

        let tx = self.events_tx.clone();
        let downloader = self.downloader.clone();
        let url = self.config.url.clone();
        tracing::info!("[目录] 刷新目录: {}", url);

        self.manifest_task = Some(tokio::spawn(async move {
            let result = downloader.fetch(&url).await;
            let _ = tx.send(CatalogEvent::ManifestLoaded(result));
        }));
        self.notify(ModelNotification::RefreshingChanged { refreshing: true });
    }

    /// 开始下载条目，条目正在下载、已下载或正在卸载时忽略
    pub fn request_download(&mut self, guid: &str) -> bool {
        let Some(index) = self.index_of(guid) else {
            return false;
        };
        let item = &self.items[index];
        if item.status.downloading || item.status.downloaded || item.status.removing {
            return false;
        }
        if item.download_url.is_empty() {
            tracing::warn!("[目录] 条目 {} 没有下载地址", guid);
            return false;
        }

        if !self.workers.contains_key(guid) {
            let url = item.download_url.clone();
            let compress = item.compress.clone();
            let worker = self.spawn_worker(guid, url, &compress);
            self.workers.insert(guid.to_string(), worker);
        }

        let status = &mut self.items[index].status;
        status.downloading = true;
        status.download_error = false;
        self.notify_item(index, vec![ItemField::Downloading, ItemField::DownloadError]);
        true
    }

    /// 取消下载，只对正在下载（尚未进入安装）的条目有效
    pub fn cancel_download(&mut self, guid: &str) -> bool {
        let Some(index) = self.index_of(guid) else {
            return false;
        };
        let status = &self.items[index].status;
        if !status.downloading || status.downloaded || status.removing || status.installing {
            return false;
        }

        if let Some(worker) = self.workers.remove(guid) {
            worker.handle.abort();
            if worker.dest.exists() {
                if let Err(e) = std::fs::remove_file(&worker.dest) {
                    tracing::debug!("[目录] 删除未完成的下载失败: {}", e);
                }
            }
            tracing::info!("[目录] 已取消下载: {}", guid);
        }

        self.items[index].status.downloading = false;
        self.notify_item(index, vec![ItemField::Downloading]);
        true
    }

    /// 卸载条目对应的诗人
    pub fn request_removal(&mut self, guid: &str) -> bool {
        let Some(index) = self.index_of(guid) else {
            return false;
        };
        let item = &mut self.items[index];
        if item.status.downloading || item.status.downloaded || item.status.removing {
            return false;
        }

        item.status.removing = true;
        let poet_id = item.poet_id;
        let queued = self.queue.enqueue_removal(guid, poet_id);
        self.notify_item(index, vec![ItemField::Removing]);

        match queued {
            Ok(()) => self.in_flight_jobs += 1,
            Err(e) => {
                tracing::error!("[目录] 无法加入卸载任务: {}", e);
                self.apply_install_event(InstallEvent::RemoveFailed {
                    guid: guid.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        true
    }

    /// 处理一个事件
    pub fn handle_event(&mut self, event: CatalogEvent) {
        match event {
            CatalogEvent::ManifestLoaded(result) => self.on_manifest_loaded(result),
            CatalogEvent::Download {
                guid,
                worker_id,
                kind,
            } => self.on_download_event(guid, worker_id, kind),
            CatalogEvent::Install(event) => {
                self.in_flight_jobs = self.in_flight_jobs.saturating_sub(1);
                self.apply_install_event(event);
            }
        }
    }

    /// 等待并处理下一个事件
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// 处理所有已到达的事件，不等待
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// 持续处理事件，直到没有刷新、下载或安装任务
    pub async fn run_until_idle(&mut self) {
        while self.refreshing() || self.processing() {
            if !self.process_next().await {
                break;
            }
        }
    }

    fn spawn_worker(&mut self, guid: &str, url: String, compress: &str) -> DownloadWorker {
        self.next_worker_id += 1;
        let id = self.next_worker_id;

        let file_name = if compress.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", uuid::Uuid::new_v4(), compress)
        };
        let dest = self.temp_dir.join(file_name);

        let tx = self.events_tx.clone();
        let downloader = self.downloader.clone();
        let task_guid = guid.to_string();
        let task_dest = dest.clone();

        let handle = tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress_guid = task_guid.clone();
            let progress = move |bytes: u64| {
                let _ = progress_tx.send(CatalogEvent::Download {
                    guid: progress_guid.clone(),
                    worker_id: id,
                    kind: DownloadEventKind::Progress(bytes),
                });
            };

            let result = downloader.download_to(&url, &task_dest, &progress).await;
            let kind = match result {
                Ok(_) => DownloadEventKind::Finished(task_dest),
                Err(e) => DownloadEventKind::Failed(e.to_string()),
            };
            let _ = tx.send(CatalogEvent::Download {
                guid: task_guid,
                worker_id: id,
                kind,
            });
        });

        tracing::info!("[目录] 开始下载 {} -> {}", guid, dest.display());
        DownloadWorker { id, dest, handle }
    }

    /// 当前列表加上本地已安装但未列出的诗人
    fn load_installed(&mut self) {
        let mut list = self.items.clone();
        list.extend(self.local_items(&self.items));
        sort_items(&mut list);
        self.publish(list);
    }

    fn local_items(&self, listed: &[CatalogItem]) -> Vec<CatalogItem> {
        self.store
            .installed_poets()
            .into_iter()
            .filter(|poet_id| !listed.iter().any(|item| item.poet_id == *poet_id))
            .map(|poet_id| {
                CatalogItem::local(poet_id, self.store.poet_name(poet_id).unwrap_or_default())
            })
            .collect()
    }

    fn on_manifest_loaded(&mut self, result: Result<Vec<u8>, DownloadError>) {
        self.manifest_task = None;

        let parsed = match result {
            Ok(data) => parse_manifest(&data, &self.config, self.store.as_ref())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(manifest) => {
                tracing::info!(
                    "[目录] 清单已加载: {} 个条目",
                    manifest.items.len()
                );
                self.name = manifest.name;
                self.description = manifest.description;

                let mut list = manifest.items;
                let local = self.local_items(&list);
                list.extend(local);
                sort_items(&mut list);
                self.publish(list);

                if !self.errors.is_empty() {
                    self.errors.clear();
                    self.notify(ModelNotification::ErrorsChanged);
                }
            }
            Err(reason) => {
                tracing::warn!("[目录] 刷新失败: {}", reason);
                self.errors = vec![reason];
                self.notify(ModelNotification::ErrorsChanged);
            }
        }

        self.notify(ModelNotification::RefreshingChanged { refreshing: false });
    }

    fn on_download_event(&mut self, guid: String, worker_id: u64, kind: DownloadEventKind) {
        // 已取消的下载任务
        if self.workers.get(&guid).map(|w| w.id) != Some(worker_id) {
            if let DownloadEventKind::Finished(path) = kind {
                let _ = std::fs::remove_file(path);
            }
            return;
        }

        match kind {
            DownloadEventKind::Progress(bytes) => {
                if let Some(index) = self.index_of(&guid) {
                    self.items[index].status.downloaded_bytes = bytes;
                    self.notify_item(index, vec![ItemField::DownloadedBytes]);
                }
            }
            DownloadEventKind::Failed(reason) => {
                self.workers.remove(&guid);
                tracing::warn!("[目录] 下载 {} 失败: {}", guid, reason);

                if let Some(index) = self.index_of(&guid) {
                    let status = &mut self.items[index].status;
                    status.download_error = true;
                    status.downloading = false;
                    status.downloaded_bytes = 0;
                    self.notify_item(
                        index,
                        vec![
                            ItemField::Downloading,
                            ItemField::DownloadError,
                            ItemField::DownloadedBytes,
                        ],
                    );
                }
            }
            DownloadEventKind::Finished(path) => {
                self.workers.remove(&guid);
                let Some(index) = self.index_of(&guid) else {
                    let _ = std::fs::remove_file(&path);
                    return;
                };
                self.hand_off_download(index, guid, path);
            }
        }
    }

    /// 下载完成，交给安装队列
    fn hand_off_download(&mut self, index: usize, guid: String, path: PathBuf) {
        let item = &mut self.items[index];
        item.status.download_error = false;
        item.status.downloading = true;
        item.status.downloaded_bytes = item.file_size;
        item.status.installing = true;
        item.status.installed = false;

        let poet_id = item.poet_id;
        let date: Option<NaiveDateTime> = item.date;
        let queued = self.queue.enqueue(path.clone(), guid.clone(), poet_id, date);

        self.notify_item(
            index,
            vec![
                ItemField::Downloading,
                ItemField::DownloadError,
                ItemField::DownloadedBytes,
                ItemField::Installing,
                ItemField::Installed,
            ],
        );

        match queued {
            Ok(()) => self.in_flight_jobs += 1,
            Err(e) => {
                tracing::error!("[目录] 无法加入安装任务: {}", e);
                let _ = std::fs::remove_file(&path);
                self.apply_install_event(InstallEvent::InstallFailed {
                    file_path: path,
                    guid,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn apply_install_event(&mut self, event: InstallEvent) {
        let Some(index) = self.index_of(event.guid()) else {
            tracing::debug!("[目录] 忽略未知条目的安装事件: {}", event.guid());
            return;
        };

        let status = &mut self.items[index].status;
        status.downloading = false;
        status.downloaded_bytes = 0;
        status.installing = false;

        let refresh_store = match &event {
            InstallEvent::Installed { .. } => {
                status.download_error = false;
                status.installed = true;
                status.update_available = false;
                true
            }
            InstallEvent::InstallFailed { reason, .. } => {
                tracing::warn!("[目录] 安装 {} 失败: {}", event.guid(), reason);
                status.download_error = true;
                status.installed = false;
                false
            }
            InstallEvent::Removed { .. } => {
                status.download_error = false;
                status.removing = false;
                status.installed = false;
                status.update_available = false;
                true
            }
            InstallEvent::RemoveFailed { reason, .. } => {
                tracing::warn!("[目录] 卸载 {} 失败: {}", event.guid(), reason);
                status.download_error = true;
                status.removing = false;
                status.installed = true;
                false
            }
        };

        self.notify_item(
            index,
            vec![
                ItemField::Downloading,
                ItemField::DownloadError,
                ItemField::DownloadedBytes,
                ItemField::Installing,
                ItemField::Installed,
                ItemField::UpdateAvailable,
                ItemField::Removing,
            ],
        );

        if refresh_store {
            self.store.refresh();
        }
    }

    /// 以差异通知的方式把列表变为 `target`
    fn publish(&mut self, target: Vec<CatalogItem>) {
        let count_changed = target.len() != self.items.len();
        let deltas = diff::plan(&self.items, &target, |item| item.guid.clone());
        if deltas.is_empty() {
            return;
        }

        for delta in &deltas {
            diff::apply(&mut self.items, &target, delta);
            let notification = match *delta {
                ListDelta::Remove { index } => ModelNotification::RowRemoved { index },
                ListDelta::Move { from, to } => ModelNotification::RowMoved {
                    from,
                    to,
                    destination: delta.destination().unwrap_or(to),
                },
                ListDelta::Insert { index } => ModelNotification::RowInserted { index },
            };
            self.notify(notification);
        }

        if count_changed {
            self.notify(ModelNotification::CountChanged {
                count: self.items.len(),
            });
        }
        self.notify(ModelNotification::ListChanged);
    }

    fn notify_item(&self, index: usize, fields: Vec<ItemField>) {
        self.notify(ModelNotification::ItemChanged { index, fields });
    }

    fn notify(&self, notification: ModelNotification) {
        self.observer.on_notification(&notification, &self.items);
    }
}

impl Drop for CatalogModel {
    fn drop(&mut self) {
        if let Some(task) = self.manifest_task.take() {
            task.abort();
        }
        for (_, worker) in self.workers.drain() {
            worker.handle.abort();
        }
    }
}
