//! 进程内远程存储
//!
//! 条目以 uuid 为标识，支持回收站标记与调用计数，便于在不联网的情况下演练和测试同步流程。

use super::{EntryId, EntryKind, EntryQuery, RemoteEntry, RemoteStore};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// 各接口被调用的次数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub list_entries: usize,
    pub create_folder: usize,
    pub create_file: usize,
    pub update_file_content: usize,
    pub get_content: usize,
}

#[derive(Debug, Default)]
struct Counters {
    list_entries: AtomicUsize,
    create_folder: AtomicUsize,
    create_file: AtomicUsize,
    update_file_content: AtomicUsize,
    get_content: AtomicUsize,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: RemoteEntry,
    content: Vec<u8>,
}

pub struct MemoryStore {
    entries: RwLock<HashMap<EntryId, StoredEntry>>,
    counters: Counters,
    offline: AtomicBool,
    latency: Option<Duration>,
    transfer_latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            offline: AtomicBool::new(false),
            latency: None,
            transfer_latency: None,
        }
    }

    /// 每次调用前等待一段时间，用于放大并发窗口
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 只作用于读写文件内容的额外延迟，模拟慢速传输
    pub fn with_transfer_latency(mut self, latency: Duration) -> Self {
        self.transfer_latency = Some(latency);
        self
    }

    /// 模拟网络中断：所有调用返回错误
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 把条目移入回收站
    pub async fn trash(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(stored) => {
                stored.entry.trashed = true;
                true
            }
            None => false,
        }
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_entries: self.counters.list_entries.load(Ordering::SeqCst),
            create_folder: self.counters.create_folder.load(Ordering::SeqCst),
            create_file: self.counters.create_file.load(Ordering::SeqCst),
            update_file_content: self.counters.update_file_content.load(Ordering::SeqCst),
            get_content: self.counters.get_content.load(Ordering::SeqCst),
        }
    }

    /// 按 `a/b/c` 形式的路径查找未删除条目
    pub async fn find_by_path(&self, path: &str) -> Option<RemoteEntry> {
        let entries = self.entries.read().await;
        let mut parent: Option<EntryId> = None;
        let mut found = None;

        for part in path.split('/').filter(|p| !p.is_empty()) {
            let entry = entries
                .values()
                .map(|s| &s.entry)
                .find(|e| !e.trashed && e.name == part && e.parent == parent)?;
            parent = Some(entry.id.clone());
            found = Some(entry.clone());
        }

        found
    }

    /// 未删除条目总数
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|s| !s.entry.trashed)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn before_call(&self, counter: &AtomicUsize, op: &str) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("memory store offline ({})", op);
        }
        Ok(())
    }

    async fn before_transfer(&self, counter: &AtomicUsize, op: &str) -> Result<()> {
        self.before_call(counter, op).await?;
        if let Some(latency) = self.transfer_latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    async fn insert(
        &self,
        name: &str,
        parent: Option<&str>,
        kind: EntryKind,
        content: Vec<u8>,
    ) -> Result<RemoteEntry> {
        let mut entries = self.entries.write().await;

        if let Some(parent_id) = parent {
            match entries.get(parent_id) {
                Some(p) if p.entry.is_folder() => {}
                _ => anyhow::bail!("父文件夹不存在: {}", parent_id),
            }
        }

        let entry = RemoteEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            kind,
            trashed: false,
        };
        entries.insert(
            entry.id.clone(),
            StoredEntry {
                entry: entry.clone(),
                content,
            },
        );

        Ok(entry)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<RemoteEntry>> {
        self.before_call(&self.counters.list_entries, "list_entries")
            .await?;
        let entries = self.entries.read().await;
        let mut matched: Vec<RemoteEntry> = entries
            .values()
            .filter(|s| query.matches(&s.entry))
            .map(|s| s.entry.clone())
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matched)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<EntryId> {
        self.before_call(&self.counters.create_folder, "create_folder")
            .await?;
        let entry = self
            .insert(name, parent, EntryKind::Folder, Vec::new())
            .await?;
        Ok(entry.id)
    }

    async fn create_file(
        &self,
        name: &str,
        parent: Option<&str>,
        data: Vec<u8>,
    ) -> Result<RemoteEntry> {
        self.before_transfer(&self.counters.create_file, "create_file")
            .await?;
        self.insert(name, parent, EntryKind::File, data).await
    }

    async fn update_file_content(&self, id: &str, data: Vec<u8>) -> Result<RemoteEntry> {
        self.before_transfer(&self.counters.update_file_content, "update_file_content")
            .await?;
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(stored) if !stored.entry.is_folder() => {
                stored.content = data;
                Ok(stored.entry.clone())
            }
            Some(_) => anyhow::bail!("不能写入文件夹: {}", id),
            None => anyhow::bail!("条目不存在: {}", id),
        }
    }

    async fn get_content(&self, id: &str) -> Result<Vec<u8>> {
        self.before_transfer(&self.counters.get_content, "get_content")
            .await?;
        let entries = self.entries.read().await;
        match entries.get(id) {
            Some(stored) if !stored.entry.is_folder() => Ok(stored.content.clone()),
            Some(_) => anyhow::bail!("不能读取文件夹: {}", id),
            None => anyhow::bail!("条目不存在: {}", id),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryStore::new();
        let docs = store.create_folder("docs", None).await.unwrap();
        let file = store
            .create_file("a.txt", Some(&docs), b"hello".to_vec())
            .await
            .unwrap();

        let found = store.find_by_path("docs/a.txt").await.unwrap();
        assert_eq!(found.id, file.id);
        assert_eq!(store.get_content(&file.id).await.unwrap(), b"hello");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_trashed_entries_hidden_from_default_query() {
        let store = MemoryStore::new();
        let docs = store.create_folder("docs", None).await.unwrap();
        assert!(store.trash(&docs).await);

        let visible = store
            .list_entries(&EntryQuery::children_of(None).named("docs"))
            .await
            .unwrap();
        assert!(visible.is_empty());

        let mut all = EntryQuery::children_of(None).named("docs");
        all.exclude_trashed = false;
        assert_eq!(store.list_entries(&all).await.unwrap().len(), 1);
        assert!(store.find_by_path("docs").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_fails_and_counts() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.create_folder("docs", None).await.is_err());
        assert_eq!(store.calls().create_folder, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_fails() {
        let store = MemoryStore::new();
        assert!(store
            .create_file("a.txt", Some("missing"), Vec::new())
            .await
            .is_err());
    }
}
