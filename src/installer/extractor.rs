//! 内容包解压
//!
//! 根据文件头判断 7z、ZIP 或 tar.gz，解压到指定目录

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use super::types::{InstallError, PackageFormat};

/// 解压器接口
pub trait Extractor: Send + Sync {
    /// 解压 `archive` 到 `dest`，`dest` 不存在时自动创建
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), InstallError>;
}

/// 7z / ZIP / tar.gz 解压器
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 读取文件头检测包格式
    pub fn detect_format(&self, path: &Path) -> Result<PackageFormat, InstallError> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 6];
        let read = file.read(&mut magic)?;

        PackageFormat::from_magic(&magic[..read]).ok_or_else(|| {
            InstallError::InvalidPackage(format!("不支持的包格式: {}", path.display()))
        })
    }

    /// 解压 7z 文件
    fn extract_7z(&self, path: &Path, dest: &Path) -> Result<(), InstallError> {
        sevenz_rust::decompress_file(path, dest)
            .map_err(|e| InstallError::ExtractFailed(format!("无法解压 7z 文件: {}", e)))
    }

    /// 解压 ZIP 文件
    fn extract_zip(&self, path: &Path, dest: &Path) -> Result<(), InstallError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| InstallError::ExtractFailed(format!("无法读取 ZIP 文件: {}", e)))?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| {
                InstallError::ExtractFailed(format!("无法读取 ZIP 条目 {}: {}", i, e))
            })?;

            // enclosed_name 会拒绝越出目标目录的路径
            let outpath = match file.enclosed_name() {
                Some(path) => dest.join(path),
                None => continue,
            };

            // 跳过 macOS 元数据
            if outpath.to_string_lossy().contains("__MACOSX") {
                continue;
            }

            if file.name().ends_with('/') {
                fs::create_dir_all(&outpath)?;
            } else {
                if let Some(p) = outpath.parent() {
                    fs::create_dir_all(p)?;
                }
                let mut outfile = File::create(&outpath)?;
                std::io::copy(&mut file, &mut outfile)?;
            }
        }

        Ok(())
    }

    /// 解压 tar.gz 文件
    fn extract_targz(&self, path: &Path, dest: &Path) -> Result<(), InstallError> {
        let file = File::open(path)?;
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);

        for entry in archive
            .entries()
            .map_err(|e| InstallError::ExtractFailed(format!("无法读取 tar.gz: {}", e)))?
        {
            let mut entry = entry
                .map_err(|e| InstallError::ExtractFailed(format!("tar.gz 条目读取失败: {}", e)))?;

            // unpack_in 会跳过越出目标目录的条目
            entry
                .unpack_in(dest)
                .map_err(|e| InstallError::ExtractFailed(format!("解压失败: {}", e)))?;
        }

        Ok(())
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), InstallError> {
        let format = self.detect_format(archive)?;
        fs::create_dir_all(dest)?;

        tracing::debug!(
            "[安装器] 解压 {:?} 包 {} -> {}",
            format,
            archive.display(),
            dest.display()
        );

        match format {
            PackageFormat::Zip => self.extract_zip(archive, dest),
            PackageFormat::TarGz => self.extract_targz(archive, dest),
            PackageFormat::SevenZ => self.extract_7z(archive, dest),
        }
    }
}
