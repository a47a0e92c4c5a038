//! 按路径串行化 - 同一文件的事件一次只处理一个

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// 每个路径一把异步锁，等待者按到达顺序获得锁
#[derive(Debug, Default)]
pub struct PathSequencer {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

/// 持有期间同一路径的其他事件会等待；释放时清理无人等待的锁
pub struct PathGuard<'a> {
    sequencer: &'a PathSequencer,
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, path: &Path) -> PathGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let guard = lock.clone().lock_owned().await;

        PathGuard {
            sequencer: self,
            path: path.to_path_buf(),
            lock,
            guard: Some(guard),
        }
    }

    /// 当前登记的路径数
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .sequencer
            .locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // map 与当前 guard 各持有一份引用时，说明没有其他等待者
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.path);
        }
    }
}
