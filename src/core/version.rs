//! 版本归档 - 每次检测到变化时保存一份带时间戳的副本

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 版本文件名中的时间戳格式，按字典序即按时间排序
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 版本归档器
///
/// 同一文件在同一秒内的多次变化会落到同一个版本槽位并相互覆盖，这是已知限制。
pub struct VersionArchiver {
    version_dir: PathBuf,
    /// 每个文件名保留的版本数，0 表示不清理
    keep_per_file: usize,
}

impl VersionArchiver {
    pub fn new(version_dir: impl Into<PathBuf>) -> Self {
        Self {
            version_dir: version_dir.into(),
            keep_per_file: 0,
        }
    }

    /// 设置保留数量（0 表示永久保留全部版本）
    pub fn with_retention(mut self, keep_per_file: usize) -> Self {
        self.keep_per_file = keep_per_file;
        self
    }

    /// 生成版本文件名 `<原文件名>_<时间戳>`
    pub fn version_name(file_name: &str, at: DateTime<Local>) -> String {
        format!("{}_{}", file_name, at.format(TIMESTAMP_FORMAT))
    }

    /// 保存文件当前内容为新版本，返回版本文件路径
    pub async fn save_version(&self, path: &Path) -> SyncResult<PathBuf> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SyncError::transient(
                    path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "路径没有文件名"),
                )
            })?;

        // 源文件必须仍然存在
        if let Err(e) = tokio::fs::metadata(path).await {
            return Err(SyncError::transient(path, e));
        }

        tokio::fs::create_dir_all(&self.version_dir)
            .await
            .map_err(|e| SyncError::Archive {
                path: self.version_dir.clone(),
                source: e,
            })?;

        let versioned = self
            .version_dir
            .join(Self::version_name(&file_name, Local::now()));

        tokio::fs::copy(path, &versioned)
            .await
            .map_err(|e| SyncError::Archive {
                path: versioned.clone(),
                source: e,
            })?;

        info!("版本已保存: {:?}", versioned);

        if self.keep_per_file > 0 {
            match self.prune(&file_name).await {
                Ok(0) => {}
                Ok(n) => debug!("清理了 {} 个旧版本: {}", n, file_name),
                Err(e) => warn!("清理旧版本失败 {}: {}", file_name, e),
            }
        }

        Ok(versioned)
    }

    /// 列出某个文件名的全部版本（按时间从旧到新）
    pub async fn list_versions(&self, file_name: &str) -> std::io::Result<Vec<PathBuf>> {
        let prefix = format!("{}_", file_name);
        let mut versions = Vec::new();

        let mut dir = match tokio::fs::read_dir(&self.version_dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = name.strip_prefix(&prefix) else {
                continue;
            };
            // 只认完整的时间戳后缀，避免把 `a.txt_x` 这类文件当作 `a.txt` 的版本
            if NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok() {
                versions.push(entry.path());
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// 删除超出保留数量的旧版本
    async fn prune(&self, file_name: &str) -> std::io::Result<usize> {
        let versions = self.list_versions(file_name).await?;
        if versions.len() <= self.keep_per_file {
            return Ok(0);
        }

        let excess = versions.len() - self.keep_per_file;
        for old in &versions[..excess] {
            tokio::fs::remove_file(old).await?;
        }
        Ok(excess)
    }
}
