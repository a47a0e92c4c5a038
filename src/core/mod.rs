pub mod detector;
pub mod engine;
pub mod fingerprint;
pub mod hash_store;
pub mod orchestrator;
pub mod reconciler;
pub mod resolver;
pub mod scanner;
pub mod sequencer;
pub mod shutdown;
pub mod version;
pub mod watcher;

pub use detector::{ChangeDetector, IgnoreReason, ProcessOutcome, ScanSummary};
pub use engine::{DownloadReport, SyncConfig, SyncEngine, UploadOutcome};
pub use fingerprint::{calculate_hash, compute_file_hash};
pub use hash_store::HashStore;
pub use orchestrator::{Orchestrator, RunSummary};
pub use reconciler::MirrorReconciler;
pub use resolver::RemotePathResolver;
pub use scanner::{FileScanner, PathFilter};
pub use sequencer::{PathGuard, PathSequencer};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use version::VersionArchiver;
pub use watcher::{ChangeEvent, ChangeKind, ChangeSource, ChannelSource, NotifySource};
