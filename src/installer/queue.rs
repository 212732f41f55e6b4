//! 安装队列
//!
//! 单个后台线程按 FIFO 顺序逐个执行安装/卸载任务，
//! 保证本地诗歌库不会同时收到两个写入任务。

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::NaiveDateTime;
use tokio::sync::mpsc;

use super::script::ScriptInstaller;
use super::types::{InstallError, InstallEvent, InstallEventSink, InstallJob};

const WORKER_THREAD_NAME: &str = "poet-install-queue";

/// 安装队列
pub struct InstallQueue {
    sender: Option<mpsc::UnboundedSender<InstallJob>>,
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl InstallQueue {
    /// 启动后台线程，安装器的所有权转移给队列
    pub fn start(
        installer: ScriptInstaller,
        sink: Arc<dyn InstallEventSink>,
    ) -> Result<Self, InstallError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = pending.clone();
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(installer, receiver, worker_pending, sink))?;

        tracing::debug!("[安装队列] 后台线程已启动");
        Ok(Self {
            sender: Some(sender),
            pending,
            worker: Some(worker),
        })
    }

    /// 添加安装任务，不阻塞调用方
    pub fn enqueue(
        &self,
        file_path: PathBuf,
        guid: impl Into<String>,
        poet_id: i64,
        date: Option<NaiveDateTime>,
    ) -> Result<(), InstallError> {
        self.push(InstallJob::Install {
            file_path,
            guid: guid.into(),
            poet_id,
            date,
        })
    }

    /// 添加卸载任务
    pub fn enqueue_removal(&self, guid: impl Into<String>, poet_id: i64) -> Result<(), InstallError> {
        self.push(InstallJob::Remove {
            guid: guid.into(),
            poet_id,
        })
    }

    fn push(&self, job: InstallJob) -> Result<(), InstallError> {
        let sender = self.sender.as_ref().ok_or(InstallError::QueueClosed)?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(InstallError::QueueClosed);
        }
        Ok(())
    }

    /// 是否有任务正在执行或排队
    pub fn is_active(&self) -> bool {
        self.pending() > 0
    }

    /// 尚未完成的任务数（含正在执行的任务）
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 停止接收新任务，执行完剩余任务后结束后台线程
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("[安装队列] 后台线程异常退出");
            } else {
                tracing::debug!("[安装队列] 后台线程已停止");
            }
        }
    }
}

impl Drop for InstallQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut installer: ScriptInstaller,
    mut receiver: mpsc::UnboundedReceiver<InstallJob>,
    pending: Arc<AtomicUsize>,
    sink: Arc<dyn InstallEventSink>,
) {
    while let Some(job) = receiver.blocking_recv() {
        let event = run_job(&mut installer, job);
        pending.fetch_sub(1, Ordering::SeqCst);
        sink.on_event(event);
    }
}

fn run_job(installer: &mut ScriptInstaller, job: InstallJob) -> InstallEvent {
    match job {
        InstallJob::Install {
            file_path,
            guid,
            poet_id,
            date,
        } => {
            tracing::info!("[安装队列] 安装诗人 {} ({})", poet_id, guid);
            match installer.install_file(&file_path, poet_id, date, true) {
                Ok(_) => InstallEvent::Installed { file_path, guid },
                Err(e) => {
                    tracing::error!("[安装队列] 安装诗人 {} 失败: {}", poet_id, e);
                    InstallEvent::InstallFailed {
                        file_path,
                        guid,
                        reason: e.to_string(),
                    }
                }
            }
        }
        InstallJob::Remove { guid, poet_id } => {
            tracing::info!("[安装队列] 卸载诗人 {} ({})", poet_id, guid);
            match installer.remove(poet_id) {
                Ok(_) => InstallEvent::Removed { guid },
                Err(e) => {
                    tracing::error!("[安装队列] 卸载诗人 {} 失败: {}", poet_id, e);
                    InstallJob::Remove { guid, poet_id }.into_failure(e.to_string())
                }
            }
        }
    }
}
