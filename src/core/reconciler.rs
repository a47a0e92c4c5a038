//! 镜像对账 - 启动时把远程树拉取到本地镜像
//!
//! 只做增量覆盖：远程已删除的文件不会从镜像中移除。

use crate::core::engine::{DownloadReport, SyncEngine};
use crate::core::shutdown::Shutdown;
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tracing::{info, warn};

pub struct MirrorReconciler {
    engine: Arc<SyncEngine>,
    /// 远程起点，`None` 为存储根目录
    remote_root: Option<String>,
}

impl MirrorReconciler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            remote_root: None,
        }
    }

    /// 从指定远程文件夹开始拉取
    pub fn with_remote_root(mut self, remote_root: impl Into<String>) -> Self {
        self.remote_root = Some(remote_root.into());
        self
    }

    /// 拉取整个远程树到镜像目录，可重复执行
    pub async fn pull_all(&self, shutdown: &Shutdown) -> SyncResult<DownloadReport> {
        let mirror_dir = self.engine.mirror_dir().to_path_buf();
        info!("开始拉取远程到镜像: {:?}", mirror_dir);

        match self
            .engine
            .download_tree(self.remote_root.as_deref(), &mirror_dir, shutdown)
            .await
        {
            Ok(report) => {
                info!(
                    "镜像拉取完成: {} 个文件夹, {} 个文件, {} 个失败",
                    report.folders_created, report.files_downloaded, report.files_failed
                );
                Ok(report)
            }
            Err(SyncError::RemoteUnavailable) => {
                warn!("远程不可用，跳过镜像拉取");
                Ok(DownloadReport::default())
            }
            Err(e) => Err(e),
        }
    }
}
