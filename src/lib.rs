pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod storage;

pub use config::AppConfig;
pub use core::{ChangeDetector, MirrorReconciler, Orchestrator, SyncConfig, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use storage::{RemoteEntry, RemoteStore};
