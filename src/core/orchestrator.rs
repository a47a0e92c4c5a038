//! 运行编排：镜像拉取 → 全量扫描 → 监控循环 → 优雅退出

use crate::config::AppConfig;
use crate::core::detector::{ChangeDetector, ScanSummary};
use crate::core::engine::{DownloadReport, SyncConfig, SyncEngine};
use crate::core::reconciler::MirrorReconciler;
use crate::core::scanner::PathFilter;
use crate::core::shutdown::Shutdown;
use crate::core::version::VersionArchiver;
use crate::core::watcher::{ChangeSource, NotifySource};
use crate::error::{SyncError, SyncResult};
use crate::notifier;
use crate::storage::{self, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub mirror: DownloadReport,
    pub initial_scan: ScanSummary,
    pub events_dispatched: usize,
}

pub struct Orchestrator {
    detector: Arc<ChangeDetector>,
    reconciler: MirrorReconciler,
    source: Box<dyn ChangeSource>,
    workers: usize,
}

impl Orchestrator {
    pub fn new(
        detector: Arc<ChangeDetector>,
        reconciler: MirrorReconciler,
        source: Box<dyn ChangeSource>,
        workers: usize,
    ) -> Self {
        Self {
            detector,
            reconciler,
            source,
            workers: workers.max(1),
        }
    }

    /// 按配置组装所有组件
    ///
    /// 远程连接失败不会终止启动：本次运行只保存本地版本。
    pub async fn from_config(config: &AppConfig) -> SyncResult<Self> {
        let watch_root = tokio::fs::canonicalize(&config.watch_path)
            .await
            .map_err(|e| {
                SyncError::Configuration(format!("监控目录不可用 {:?}: {}", config.watch_path, e))
            })?;
        if !watch_root.is_dir() {
            return Err(SyncError::Configuration(format!(
                "监控路径不是目录: {:?}",
                watch_root
            )));
        }

        let store = match &config.remote {
            Some(remote) => match storage::connect(remote).await {
                Ok(store) => {
                    info!("已连接远程存储: {}", store.name());
                    Some(store)
                }
                Err(e) => {
                    warn!("远程存储连接失败，本次运行仅保存本地版本: {:#}", e);
                    None
                }
            },
            None => {
                info!("未配置远程存储，仅保存本地版本");
                None
            }
        };

        let (op_timeout, io_timeout) = config
            .remote
            .as_ref()
            .map(|r| (r.op_timeout_secs, r.io_timeout_secs))
            .unwrap_or((OP_TIMEOUT_SECS, IO_TIMEOUT_SECS));
        let sync_config = SyncConfig::new(&config.mirror.dir)
            .with_op_timeout(Duration::from_secs(op_timeout))
            .with_io_timeout(Duration::from_secs(io_timeout));
        let engine = Arc::new(SyncEngine::new(store, sync_config));

        let filter = Arc::new(PathFilter::new(
            config.ignore_segments(),
            &config.watcher.exclude_patterns,
        ));
        let archiver = VersionArchiver::new(&config.versions.dir)
            .with_retention(config.versions.keep_per_file);
        let notifier = notifier::from_config(&config.notification)
            .map_err(|e| SyncError::Configuration(format!("通知配置无效: {}", e)))?;

        let detector = Arc::new(ChangeDetector::new(
            &watch_root,
            filter,
            archiver,
            engine.clone(),
            notifier,
        ));
        let source = Box::new(NotifySource::new(
            &watch_root,
            config.watcher.mode,
            Duration::from_secs(config.watcher.poll_interval_secs),
        ));

        info!("监控目录: {:?}", watch_root);
        Ok(Self::new(
            detector,
            MirrorReconciler::new(engine),
            source,
            config.watcher.workers,
        ))
    }

    /// 运行直到 `shutdown` 触发或事件流结束
    ///
    /// 镜像拉取和全量扫描阶段同样响应停止信号；
    /// 停止后不再接收新事件，已派发的任务全部执行完才返回。
    pub async fn run(self, mut shutdown: Shutdown) -> SyncResult<RunSummary> {
        let mut summary = RunSummary::default();

        if !shutdown.is_triggered() {
            summary.mirror = match self.reconciler.pull_all(&shutdown).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("镜像拉取失败: {}", e);
                    DownloadReport::default()
                }
            };
        }

        if !shutdown.is_triggered() {
            summary.initial_scan = match self.detector.scan_existing(&shutdown).await {
                Ok(scan) => scan,
                Err(e) => {
                    warn!("全量扫描失败: {:#}", e);
                    ScanSummary::default()
                }
            };
        }

        if shutdown.is_triggered() {
            info!("收到停止信号，跳过文件监控");
            return Ok(summary);
        }

        let mut events = self
            .source
            .subscribe()
            .map_err(|e| SyncError::Configuration(format!("无法启动文件监控: {:#}", e)))?;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        info!("进入监控循环 ({} 个 worker)", self.workers);

        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => {
                    info!("收到停止信号，不再接收新事件");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        info!("事件流已结束");
                        break;
                    }
                },
            };

            if !event.has_content() {
                continue;
            }

            // 等待空闲 worker，期间也响应停止信号
            let permit = tokio::select! {
                _ = shutdown.wait() => {
                    info!("收到停止信号，不再接收新事件");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let detector = self.detector.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                detector.process_file(&event.path).await;
            }));
            summary.events_dispatched += 1;

            handles.retain(|h| !h.is_finished());
        }

        drop(events);

        if !handles.is_empty() {
            info!("等待 {} 个处理中的任务完成", handles.len());
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("处理任务异常退出: {}", e);
            }
        }

        info!("已停止，共处理 {} 个事件", summary.events_dispatched);
        Ok(summary)
    }
}
