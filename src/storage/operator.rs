//! 基于 opendal `Operator` 的远程存储
//!
//! 对象存储没有独立的条目 ID，这里直接用相对路径作为标识：
//! 文件夹为 `docs/`（带结尾斜杠），文件为 `docs/report.txt`。

use super::{EntryId, EntryKind, EntryQuery, RemoteEntry, RemoteStore};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{Metakey, Operator};

pub struct OperatorStore {
    operator: Operator,
    name: String,
}

impl OperatorStore {
    pub fn new(operator: Operator) -> Self {
        let info = operator.info();
        let name = format!("{}://{}{}", info.scheme(), info.name(), info.root());
        Self { operator, name }
    }

    /// 检查存储是否可访问
    pub async fn check(&self) -> Result<()> {
        self.operator.check().await?;
        Ok(())
    }

    fn folder_path(parent: Option<&str>) -> &str {
        match parent {
            Some(p) if !p.is_empty() => p,
            _ => "/",
        }
    }

    fn child_path(name: &str, parent: Option<&str>) -> Result<String> {
        if name.is_empty() || name.contains('/') {
            anyhow::bail!("非法条目名称: {:?}", name);
        }
        Ok(format!("{}{}", parent.unwrap_or(""), name))
    }

    /// 由路径还原条目信息
    fn entry_from_path(path: &str) -> RemoteEntry {
        let path = path.trim_start_matches('/');
        let is_dir = path.ends_with('/');
        let trimmed = path.trim_end_matches('/');
        let (parent, name) = match trimmed.rfind('/') {
            Some(idx) => (Some(trimmed[..=idx].to_string()), &trimmed[idx + 1..]),
            None => (None, trimmed),
        };

        RemoteEntry {
            id: path.to_string(),
            name: name.to_string(),
            parent,
            kind: if is_dir {
                EntryKind::Folder
            } else {
                EntryKind::File
            },
            trashed: false,
        }
    }
}

#[async_trait]
impl RemoteStore for OperatorStore {
    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<RemoteEntry>> {
        let dir = Self::folder_path(query.parent.as_deref());

        let mut lister = match self
            .operator
            .lister_with(dir)
            .metakey(Metakey::Mode)
            .await
        {
            Ok(lister) => lister,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = lister.try_next().await? {
            let path = item.path();

            // 跳过目录自身
            if path.is_empty() || path == "/" || path.trim_start_matches('/') == dir {
                continue;
            }

            let mut entry = Self::entry_from_path(path);
            if item.metadata().is_dir() && entry.kind == EntryKind::File {
                entry.id.push('/');
                entry.kind = EntryKind::Folder;
            }

            if query.matches(&entry) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<EntryId> {
        let path = format!("{}/", Self::child_path(name, parent)?);
        self.operator.create_dir(&path).await?;
        Ok(path)
    }

    async fn create_file(
        &self,
        name: &str,
        parent: Option<&str>,
        data: Vec<u8>,
    ) -> Result<RemoteEntry> {
        let path = Self::child_path(name, parent)?;
        self.operator.write(&path, data).await?;
        Ok(Self::entry_from_path(&path))
    }

    async fn update_file_content(&self, id: &str, data: Vec<u8>) -> Result<RemoteEntry> {
        if id.ends_with('/') {
            anyhow::bail!("不能写入文件夹: {}", id);
        }
        self.operator.write(id, data).await?;
        Ok(Self::entry_from_path(id))
    }

    async fn get_content(&self, id: &str) -> Result<Vec<u8>> {
        let data = self.operator.read(id).await?;
        Ok(data.to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_store() -> (tempfile::TempDir, OperatorStore) {
        let dir = tempfile::tempdir().unwrap();
        let operator = super::super::local::build_operator(dir.path().to_str().unwrap()).unwrap();
        (dir, OperatorStore::new(operator))
    }

    #[test]
    fn test_entry_from_path() {
        let folder = OperatorStore::entry_from_path("docs/sub/");
        assert_eq!(folder.name, "sub");
        assert_eq!(folder.parent.as_deref(), Some("docs/"));
        assert_eq!(folder.kind, EntryKind::Folder);

        let file = OperatorStore::entry_from_path("report.txt");
        assert_eq!(file.name, "report.txt");
        assert_eq!(file.parent, None);
        assert_eq!(file.kind, EntryKind::File);
    }

    #[tokio::test]
    async fn test_folder_and_file_lifecycle() {
        let (dir, store) = local_store();

        let docs = store.create_folder("docs", None).await.unwrap();
        assert_eq!(docs, "docs/");

        let created = store
            .create_file("report.txt", Some(&docs), b"v1".to_vec())
            .await
            .unwrap();
        assert_eq!(created.id, "docs/report.txt");
        assert_eq!(
            std::fs::read(dir.path().join("docs/report.txt")).unwrap(),
            b"v1"
        );

        let found = store
            .list_entries(
                &EntryQuery::children_of(Some(&docs))
                    .named("report.txt")
                    .of_kind(EntryKind::File),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);

        store
            .update_file_content(&created.id, b"v2".to_vec())
            .await
            .unwrap();
        assert_eq!(store.get_content(&created.id).await.unwrap(), b"v2");

        let root = store.list_entries(&EntryQuery::children_of(None)).await.unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_folder());
        assert_eq!(root[0].name, "docs");
    }

    #[tokio::test]
    async fn test_rejects_nested_names() {
        let (_dir, store) = local_store();
        assert!(store.create_folder("a/b", None).await.is_err());
        assert!(store.create_file("", None, Vec::new()).await.is_err());
    }
}
