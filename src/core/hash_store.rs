//! 文件指纹表 - 记录每个文件最近一次处理时的内容 hash

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// 绝对路径 -> 最近一次的指纹
///
/// 只存在于进程内，启动时为空，首轮扫描因此会把所有文件视为新文件。
/// 比较与更新必须在同一路径的串行区内完成（见 `PathSequencer`）。
#[derive(Debug, Default)]
pub struct HashStore {
    inner: RwLock<HashMap<PathBuf, String>>,
}

impl HashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &Path) -> Option<String> {
        self.inner.read().await.get(path).cloned()
    }

    /// 记录新指纹；返回 `true` 表示内容发生了变化（或之前未跟踪）
    pub async fn update_if_changed(&self, path: &Path, digest: &str) -> bool {
        let mut map = self.inner.write().await;
        match map.get(path) {
            Some(existing) if existing == digest => false,
            _ => {
                map.insert(path.to_path_buf(), digest.to_string());
                true
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
