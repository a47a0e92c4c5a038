//! 同步引擎 - 上传到远程并写入镜像，启动时把远程树下载到本地

use crate::core::resolver::RemotePathResolver;
use crate::core::shutdown::Shutdown;
use crate::error::{SyncError, SyncResult};
use crate::storage::{
    EntryKind, EntryQuery, RemoteEntry, RemoteStore, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 本地镜像目录
    pub mirror_dir: PathBuf,
    /// 元数据调用超时（列目录、建文件夹）
    pub op_timeout: Duration,
    /// 数据传输超时（上传、下载文件内容）
    pub io_timeout: Duration,
}

impl SyncConfig {
    pub fn new(mirror_dir: impl Into<PathBuf>) -> Self {
        Self {
            mirror_dir: mirror_dir.into(),
            op_timeout: Duration::from_secs(OP_TIMEOUT_SECS),
            io_timeout: Duration::from_secs(IO_TIMEOUT_SECS),
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 远程不存在，新建了文件
    Created(RemoteEntry),
    /// 远程已有同名文件，原地更新
    Updated(RemoteEntry),
}

impl UploadOutcome {
    pub fn entry(&self) -> &RemoteEntry {
        match self {
            UploadOutcome::Created(entry) | UploadOutcome::Updated(entry) => entry,
        }
    }
}

/// 下载报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub folders_created: u32,
    pub files_downloaded: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
    /// 收到停止信号，未下载完整棵树
    pub interrupted: bool,
}

/// 带超时的远程调用，把存储层错误归类为 `SyncError`
pub(crate) async fn remote_call<T, F>(
    op: &'static str,
    timeout: Duration,
    fut: F,
) -> SyncResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SyncError::remote(op, e)),
        Err(_) => Err(SyncError::Timeout {
            op,
            secs: timeout.as_secs(),
        }),
    }
}

struct RemoteHandle {
    store: Arc<dyn RemoteStore>,
    resolver: RemotePathResolver,
}

/// 同步引擎
///
/// 负责决定新建还是更新远程文件、执行传输，并在成功后同步写入本地镜像。
/// 远程客户端缺失时所有网络操作直接返回 `RemoteUnavailable`。
pub struct SyncEngine {
    remote: Option<RemoteHandle>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Option<Arc<dyn RemoteStore>>, config: SyncConfig) -> Self {
        let remote = store.map(|store| RemoteHandle {
            resolver: RemotePathResolver::new(store.clone(), config.op_timeout),
            store,
        });
        Self { remote, config }
    }

    pub fn mirror_dir(&self) -> &Path {
        &self.config.mirror_dir
    }

    fn remote(&self) -> SyncResult<&RemoteHandle> {
        self.remote.as_ref().ok_or(SyncError::RemoteUnavailable)
    }

    /// 上传本地文件到远程相同相对路径，并更新镜像
    pub async fn upload(
        &self,
        local_path: &Path,
        relative_path: &Path,
    ) -> SyncResult<UploadOutcome> {
        let remote = self.remote()?;

        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SyncError::transient(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "路径没有文件名"),
                )
            })?;

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| SyncError::transient(local_path, e))?;

        let parent = remote.resolver.resolve(relative_path).await?;

        let query = EntryQuery::children_of(parent.as_deref())
            .named(&file_name)
            .of_kind(EntryKind::File);
        let existing = remote_call(
            "list_entries",
            self.config.op_timeout,
            remote.store.list_entries(&query),
        )
        .await?;

        let size = data.len();
        let outcome = match existing.into_iter().next() {
            Some(entry) => {
                let updated = remote_call(
                    "update_file_content",
                    self.config.io_timeout,
                    remote.store.update_file_content(&entry.id, data.clone()),
                )
                .await?;
                info!("已更新: {:?} ({} 字节)", relative_path, size);
                UploadOutcome::Updated(updated)
            }
            None => {
                let created = remote_call(
                    "create_file",
                    self.config.io_timeout,
                    remote
                        .store
                        .create_file(&file_name, parent.as_deref(), data.clone()),
                )
                .await?;
                info!("已上传: {:?} ({} 字节)", relative_path, size);
                UploadOutcome::Created(created)
            }
        };

        // 远程写入成功后再写镜像，保持镜像与远程一致而无需重新下载
        let mirror_path = self.config.mirror_dir.join(relative_path);
        write_atomic(&mirror_path, &data)
            .await
            .map_err(|e| SyncError::Mirror {
                path: mirror_path.clone(),
                source: e,
            })?;
        debug!("镜像已更新: {:?}", mirror_path);

        Ok(outcome)
    }

    /// 把远程文件夹（`None` 为根目录）完整下载到本地目录
    ///
    /// 使用显式工作队列而不是递归。空文件夹是正常情况；
    /// 单个文件或子文件夹失败只计数，不中断整体下载。
    /// 收到停止信号后在条目之间停下，已开始的文件会写完。
    pub async fn download_tree(
        &self,
        remote_folder: Option<&str>,
        local_path: &Path,
        shutdown: &Shutdown,
    ) -> SyncResult<DownloadReport> {
        let remote = self.remote()?;
        let op_timeout = self.config.op_timeout;
        let io_timeout = self.config.io_timeout;
        let mut report = DownloadReport::default();

        tokio::fs::create_dir_all(local_path)
            .await
            .map_err(|e| SyncError::Mirror {
                path: local_path.to_path_buf(),
                source: e,
            })?;

        let mut queue: VecDeque<(Option<String>, PathBuf)> = VecDeque::new();
        queue.push_back((remote_folder.map(str::to_string), local_path.to_path_buf()));
        let mut is_start = true;

        'walk: while let Some((folder, dir)) = queue.pop_front() {
            let query = EntryQuery::children_of(folder.as_deref());
            let listing = remote.store.list_entries(&query);
            let entries = match remote_call("list_entries", op_timeout, listing).await {
                Ok(entries) => entries,
                // 起点都列不出来，直接返回错误
                Err(e) if is_start => return Err(e),
                Err(e) => {
                    warn!("列出远程文件夹失败 {:?}: {}", dir, e);
                    report.files_failed += 1;
                    continue;
                }
            };
            is_start = false;

            for entry in entries {
                if shutdown.is_triggered() {
                    info!("收到停止信号，镜像下载提前结束");
                    report.interrupted = true;
                    break 'walk;
                }
                if !is_safe_name(&entry.name) {
                    warn!("跳过非法名称的远程条目: {:?}", entry.name);
                    continue;
                }
                let target = dir.join(&entry.name);

                match entry.kind {
                    EntryKind::Folder => {
                        if let Err(e) = tokio::fs::create_dir_all(&target).await {
                            warn!("创建镜像目录失败 {:?}: {}", target, e);
                            report.files_failed += 1;
                            continue;
                        }
                        report.folders_created += 1;
                        queue.push_back((Some(entry.id), target));
                    }
                    EntryKind::File => {
                        let download = remote.store.get_content(&entry.id);
                        let data = match remote_call("get_content", io_timeout, download).await {
                            Ok(data) => data,
                            Err(e) => {
                                warn!("下载失败 {:?}: {}", target, e);
                                report.files_failed += 1;
                                continue;
                            }
                        };
                        let size = data.len() as u64;
                        match write_atomic(&target, &data).await {
                            Ok(()) => {
                                debug!("已下载: {:?} ({} 字节)", target, size);
                                report.files_downloaded += 1;
                                report.bytes_transferred += size;
                            }
                            Err(e) => {
                                warn!("写入镜像失败 {:?}: {}", target, e);
                                report.files_failed += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

/// 远程名称只能是单个普通路径片段，防止写出镜像目录
fn is_safe_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

/// 先写临时文件再重命名，避免留下半截文件
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        // 目录已存在时 create_dir_all 不报错
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    tokio::fs::write(&temp_path, data).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}
