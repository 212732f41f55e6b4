//! 下载器
//!
//! 清单整体读入内存，内容包以流的方式写入临时文件

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;

/// 下载错误
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP 状态错误: {0}")]
    Status(u16),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("下载失败: {0}")]
    Other(String),
}

/// 下载器接口
#[async_trait]
pub trait Downloader: Send + Sync {
    /// 读取整个响应体
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;

    /// 下载到文件，每收到一块数据就以累计字节数调用 `progress`
    ///
    /// 返回写入的总字节数
    async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError>;
}

/// 基于 reqwest 的 HTTP 下载器
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError> {
        let response = self.get(url).await?;
        tracing::debug!(
            "[下载] 文件大小: {} bytes",
            response.content_length().unwrap_or(0)
        );

        // 确保目标目录存在
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(dest).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded);
        }

        file.flush().await?;
        Ok(downloaded)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        tracing::info!("[下载] 获取清单: {}", url);
        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError> {
        tracing::info!("[下载] 开始下载: {} -> {}", url, dest.display());

        match self.stream_to_file(url, dest, progress).await {
            Ok(size) => {
                tracing::info!("[下载] 下载完成: {} ({} bytes)", dest.display(), size);
                Ok(size)
            }
            Err(e) => {
                // 不保留不完整的文件
                let _ = fs::remove_file(dest).await;
                tracing::warn!("[下载] 下载失败 {}: {}", url, e);
                Err(e)
            }
        }
    }
}
