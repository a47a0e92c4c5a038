//! 变化检测 - 过滤、去重，并驱动 版本 → 上传 → 镜像 → 通知 流水线

use crate::core::engine::{SyncEngine, UploadOutcome};
use crate::core::fingerprint::compute_file_hash;
use crate::core::hash_store::HashStore;
use crate::core::scanner::{FileScanner, PathFilter};
use crate::core::sequencer::PathSequencer;
use crate::core::shutdown::Shutdown;
use crate::core::version::VersionArchiver;
use crate::error::{SyncError, SyncResult};
use crate::notifier::Notifier;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 忽略原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 不在监控根目录下
    OutsideRoot,
    /// 命中忽略片段或排除规则
    Filtered,
    /// 目录、已删除或不是普通文件
    NotAFile,
}

/// 单次处理结果，每个阶段的结果都保留下来
#[derive(Debug)]
pub enum ProcessOutcome {
    Ignored(IgnoreReason),
    /// 无法计算指纹（文件被占用或已删除），跳过本次事件
    Skipped(SyncError),
    /// 内容与上次相同
    Unchanged,
    Changed {
        version: SyncResult<PathBuf>,
        upload: SyncResult<UploadOutcome>,
    },
}

impl ProcessOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, ProcessOutcome::Changed { .. })
    }
}

/// 全量扫描统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub upload_failed: usize,
    /// 收到停止信号，剩余文件未处理
    pub interrupted: bool,
}

impl ScanSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Ignored(_) => self.ignored += 1,
            ProcessOutcome::Skipped(_) => self.skipped += 1,
            ProcessOutcome::Unchanged => self.unchanged += 1,
            ProcessOutcome::Changed { upload, .. } => {
                self.changed += 1;
                if upload.is_err() {
                    self.upload_failed += 1;
                }
            }
        }
    }
}

pub struct ChangeDetector {
    watch_root: PathBuf,
    filter: Arc<PathFilter>,
    hashes: HashStore,
    sequencer: PathSequencer,
    archiver: VersionArchiver,
    engine: Arc<SyncEngine>,
    notifier: Arc<dyn Notifier>,
}

impl ChangeDetector {
    pub fn new(
        watch_root: impl Into<PathBuf>,
        filter: Arc<PathFilter>,
        archiver: VersionArchiver,
        engine: Arc<SyncEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            watch_root: watch_root.into(),
            filter,
            hashes: HashStore::new(),
            sequencer: PathSequencer::new(),
            archiver,
            engine,
            notifier,
        }
    }

    pub fn hash_store(&self) -> &HashStore {
        &self.hashes
    }

    /// 处理一个文件路径（绝对路径）
    ///
    /// 同一路径的调用按到达顺序串行执行；指纹比较和更新都在串行区内完成。
    pub async fn process_file(&self, path: &Path) -> ProcessOutcome {
        let Ok(relative) = path.strip_prefix(&self.watch_root) else {
            debug!("不在监控目录内，忽略: {:?}", path);
            return ProcessOutcome::Ignored(IgnoreReason::OutsideRoot);
        };
        let relative = relative.to_path_buf();

        if self.filter.should_exclude(&relative) {
            debug!("已排除: {:?}", relative);
            return ProcessOutcome::Ignored(IgnoreReason::Filtered);
        }

        let _guard = self.sequencer.acquire(path).await;

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return ProcessOutcome::Ignored(IgnoreReason::NotAFile),
        }

        let digest = match compute_file_hash(path).await {
            Ok(digest) => digest,
            Err(e) => {
                let err = SyncError::transient(path, e);
                warn!("跳过: {}", err);
                return ProcessOutcome::Skipped(err);
            }
        };

        // 先更新指纹：同一次变化最多只上传一次，上传失败要等下次内容变化
        if !self.hashes.update_if_changed(path, &digest).await {
            debug!("内容未变化: {:?}", relative);
            return ProcessOutcome::Unchanged;
        }

        info!("检测到变化: {:?} ({})", relative, digest);

        let version = self.archiver.save_version(path).await;
        if let Err(e) = &version {
            warn!("保存版本失败，继续上传: {}", e);
        }

        let upload = self.engine.upload(path, &relative).await;
        match &upload {
            Ok(_) => self.notify(&relative).await,
            Err(SyncError::RemoteUnavailable) => {
                debug!("远程不可用，仅保存本地版本: {:?}", relative)
            }
            Err(e) => warn!("上传失败 {:?}: {}", relative, e),
        }

        ProcessOutcome::Changed { version, upload }
    }

    async fn notify(&self, relative: &Path) {
        let message = format!("Backup: {}", relative.display());
        if let Err(e) = self.notifier.send(&message).await {
            warn!("发送通知失败: {}", e);
        }
    }

    /// 启动时的全量扫描，所有文件走与事件相同的处理路径
    ///
    /// 每个文件处理前检查停止信号，已开始的文件总会处理完。
    pub async fn scan_existing(&self, shutdown: &Shutdown) -> anyhow::Result<ScanSummary> {
        let scanner = FileScanner::new(&self.watch_root, self.filter.clone());
        let files = scanner.scan().await?;

        let mut summary = ScanSummary::default();
        for file in files {
            if shutdown.is_triggered() {
                info!("收到停止信号，全量扫描提前结束");
                summary.interrupted = true;
                break;
            }
            let outcome = self.process_file(&file).await;
            summary.record(&outcome);
        }

        info!(
            "全量扫描完成: {} 个变化, {} 个未变, {} 个跳过, {} 个上传失败",
            summary.changed, summary.unchanged, summary.skipped, summary.upload_failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::SyncConfig;
    use crate::notifier::RecordingNotifier;
    use crate::storage::{MemoryStore, RemoteStore};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        detector: Arc<ChangeDetector>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::build(true, RecordingNotifier::default())
        }

        fn build(with_remote: bool, notifier: RecordingNotifier) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("watch");
            std::fs::create_dir_all(&root).unwrap();

            let store = Arc::new(MemoryStore::new());
            let remote = with_remote.then(|| store.clone() as Arc<dyn RemoteStore>);
            let engine = Arc::new(SyncEngine::new(
                remote,
                SyncConfig::new(root.join("drive_mirror")),
            ));
            let filter = Arc::new(PathFilter::new(
                vec!["versions".into(), "logs".into(), "drive_mirror".into()],
                &["*.tmp".to_string()],
            ));
            let notifier = Arc::new(notifier);
            let detector = Arc::new(ChangeDetector::new(
                &root,
                filter,
                VersionArchiver::new(root.join("versions")),
                engine,
                notifier.clone(),
            ));

            Self {
                _dir: dir,
                root,
                store,
                notifier,
                detector,
            }
        }

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }

        fn version_count(&self) -> usize {
            std::fs::read_dir(self.root.join("versions"))
                .map(|d| d.count())
                .unwrap_or(0)
        }

        fn version_names(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.root.join("versions"))
                .map(|d| {
                    d.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            names
        }
    }

    #[tokio::test]
    async fn test_new_file_is_versioned_uploaded_and_notified() {
        let fx = Fixture::new();
        let path = fx.write("docs/a.txt", "v1");

        let outcome = fx.detector.process_file(&path).await;

        let ProcessOutcome::Changed { version, upload } = outcome else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert!(version.unwrap().starts_with(fx.root.join("versions")));
        assert!(matches!(upload.unwrap(), UploadOutcome::Created(_)));
        assert_eq!(
            fx.store.find_by_path("docs/a.txt").await.map(|e| e.name),
            Some("a.txt".to_string())
        );
        assert_eq!(
            std::fs::read_to_string(fx.root.join("drive_mirror/docs/a.txt")).unwrap(),
            "v1"
        );
        let expected = format!("Backup: {}", Path::new("docs/a.txt").display());
        assert_eq!(fx.notifier.messages(), vec![expected]);
        assert!(fx.detector.hash_store().get(&path).await.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_content_is_noop() {
        let fx = Fixture::new();
        let path = fx.write("a.txt", "same");

        assert!(fx.detector.process_file(&path).await.is_changed());
        let calls = fx.store.calls();
        let versions = fx.version_count();

        // 重写相同内容（仅 mtime 变化）
        fx.write("a.txt", "same");
        let outcome = fx.detector.process_file(&path).await;

        assert!(matches!(outcome, ProcessOutcome::Unchanged));
        assert_eq!(fx.store.calls(), calls);
        assert_eq!(fx.version_count(), versions);
        assert_eq!(fx.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_modified_file_updates_in_place() {
        let fx = Fixture::new();
        let path = fx.write("a.txt", "v1");
        fx.detector.process_file(&path).await;

        fx.write("a.txt", "v2");
        let outcome = fx.detector.process_file(&path).await;

        let ProcessOutcome::Changed { version, upload } = outcome else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert!(version.is_ok());
        let UploadOutcome::Updated(entry) = upload.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(fx.store.get_content(&entry.id).await.unwrap(), b"v2");
        assert_eq!(fx.store.calls().create_file, 1);
        assert_eq!(fx.store.calls().update_file_content, 1);
        assert_eq!(fx.notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_edit_after_backup_adds_one_later_version() {
        let fx = Fixture::new();
        let path = fx.write("docs/report.txt", "v1");
        assert!(fx.detector.process_file(&path).await.is_changed());
        let before = fx.version_names();
        assert_eq!(before.len(), 1);

        // 版本名精确到秒，跨过秒边界再修改
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        fx.write("docs/report.txt", "v2");
        let outcome = fx.detector.process_file(&path).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Changed { version: Ok(_), upload: Ok(UploadOutcome::Updated(_)) }
        ));

        let after = fx.version_names();
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after[0], before[0]);
        assert!(after[1] > after[0]);
        assert!(after[1].starts_with("report.txt_"));
        assert_eq!(
            std::fs::read_to_string(fx.root.join("versions").join(&after[1])).unwrap(),
            "v2"
        );

        let calls = fx.store.calls();
        assert_eq!(calls.create_file, 1);
        assert_eq!(calls.update_file_content, 1);
        assert_eq!(
            std::fs::read_to_string(fx.root.join("drive_mirror/docs/report.txt")).unwrap(),
            "v2"
        );
    }

    #[tokio::test]
    async fn test_remote_unavailable_still_versions() {
        let fx = Fixture::build(false, RecordingNotifier::default());
        let path = fx.write("a.txt", "offline");

        let outcome = fx.detector.process_file(&path).await;

        let ProcessOutcome::Changed { version, upload } = outcome else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert!(version.is_ok());
        assert!(matches!(upload, Err(SyncError::RemoteUnavailable)));
        assert_eq!(fx.version_count(), 1);
        assert!(fx.notifier.messages().is_empty());
        assert!(!fx.root.join("drive_mirror/a.txt").exists());
    }

    #[tokio::test]
    async fn test_remote_failure_does_not_retry_same_content() {
        let fx = Fixture::new();
        let path = fx.write("a.txt", "v1");

        fx.store.set_offline(true);
        let outcome = fx.detector.process_file(&path).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Changed { upload: Err(SyncError::RemoteOperation { .. }), .. }
        ));

        fx.store.set_offline(false);
        assert!(matches!(
            fx.detector.process_file(&path).await,
            ProcessOutcome::Unchanged
        ));
        assert!(fx.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let fx = Fixture::build(true, RecordingNotifier::failing());
        let path = fx.write("a.txt", "v1");

        let outcome = fx.detector.process_file(&path).await;

        assert!(matches!(
            outcome,
            ProcessOutcome::Changed { upload: Ok(_), .. }
        ));
        assert_eq!(fx.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_paths() {
        let fx = Fixture::new();
        let in_versions = fx.write("versions/a.txt_20240101_000000", "x");
        let in_mirror = fx.write("drive_mirror/a.txt", "x");
        let tmp = fx.write("draft.tmp", "x");
        std::fs::create_dir_all(fx.root.join("folder")).unwrap();

        for (path, reason) in [
            (in_versions, IgnoreReason::Filtered),
            (in_mirror, IgnoreReason::Filtered),
            (tmp, IgnoreReason::Filtered),
            (fx.root.join("folder"), IgnoreReason::NotAFile),
            (fx.root.join("missing.txt"), IgnoreReason::NotAFile),
            (PathBuf::from("/elsewhere/a.txt"), IgnoreReason::OutsideRoot),
        ] {
            let outcome = fx.detector.process_file(&path).await;
            assert!(
                matches!(outcome, ProcessOutcome::Ignored(r) if r == reason),
                "{:?} -> {:?}",
                path,
                outcome
            );
        }

        assert!(fx.detector.hash_store().is_empty().await);
        assert_eq!(fx.store.calls().list_entries, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_for_same_file_upload_once() {
        let fx = Fixture::new();
        let path = fx.write("docs/a.txt", "content");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let detector = fx.detector.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                detector.process_file(&path).await.is_changed()
            }));
        }

        let mut changed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                changed += 1;
            }
        }

        assert_eq!(changed, 1);
        assert_eq!(fx.store.calls().create_file, 1);
        assert_eq!(fx.store.calls().create_folder, 1);
        assert_eq!(fx.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_existing_processes_every_file_once() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        fx.write("docs/b.txt", "b");
        fx.write("docs/c.tmp", "c");

        let first = fx.detector.scan_existing(&Shutdown::never()).await.unwrap();
        assert_eq!(first.changed, 2);
        assert_eq!(first.upload_failed, 0);

        let second = fx.detector.scan_existing(&Shutdown::never()).await.unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(second.unchanged, 2);

        // 镜像和版本目录在监控目录内，但不会被扫描到
        assert_eq!(fx.store.calls().create_file, 2);
    }

    #[tokio::test]
    async fn test_scan_stops_when_shutdown_triggered() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        fx.write("b.txt", "b");

        let (trigger, shutdown) = crate::core::shutdown::channel();
        trigger.trigger();
        let summary = fx.detector.scan_existing(&shutdown).await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.changed, 0);
        assert_eq!(fx.version_count(), 0);
        assert_eq!(fx.store.calls().create_file, 0);
    }
}
