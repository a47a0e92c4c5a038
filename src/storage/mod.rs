pub mod local;
pub mod memory;
pub mod operator;
pub mod s3;
pub mod webdav;

use crate::config::{RemoteConfig, StorageType};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use operator::OperatorStore;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, create_dir 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 远程条目标识
pub type EntryId = String;

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// 远程条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: EntryId,
    pub name: String,
    /// 父文件夹，`None` 表示存储根目录
    pub parent: Option<EntryId>,
    pub kind: EntryKind,
    pub trashed: bool,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// 列表查询条件
///
/// 查询总是限定在 `parent` 的直接子项内（`None` 为根目录），名称为精确匹配。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub name: Option<String>,
    pub parent: Option<EntryId>,
    pub kind: Option<EntryKind>,
    pub exclude_trashed: bool,
}

impl EntryQuery {
    /// 列出某个文件夹下未删除的全部子项
    pub fn children_of(parent: Option<&str>) -> Self {
        Self {
            name: None,
            parent: parent.map(str::to_string),
            kind: None,
            exclude_trashed: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn of_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// 判断条目是否满足查询（父目录由调用方保证）
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        if self.exclude_trashed && entry.trashed {
            return false;
        }
        if let Some(name) = &self.name {
            if &entry.name != name {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        entry.parent == self.parent
    }
}

/// 远程存储抽象接口
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 按条件列出条目
    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<RemoteEntry>>;

    /// 在父文件夹下创建文件夹，返回新文件夹标识
    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<EntryId>;

    /// 在父文件夹下创建文件
    async fn create_file(
        &self,
        name: &str,
        parent: Option<&str>,
        data: Vec<u8>,
    ) -> Result<RemoteEntry>;

    /// 原地更新文件内容，保留远程标识
    async fn update_file_content(&self, id: &str, data: Vec<u8>) -> Result<RemoteEntry>;

    /// 读取文件内容
    async fn get_content(&self, id: &str) -> Result<Vec<u8>>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建远程客户端并检查连通性
///
/// 返回错误时调用方应把远程视为不可用，而不是终止进程。
pub async fn connect(config: &RemoteConfig) -> Result<Arc<dyn RemoteStore>> {
    let operator = match config.typ {
        StorageType::Memory => {
            tracing::info!("使用内存存储");
            return Ok(Arc::new(MemoryStore::new()) as Arc<dyn RemoteStore>);
        }
        StorageType::Local => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Local storage requires path"))?;
            tracing::info!("初始化本地存储: {}", path);
            local::build_operator(path)?
        }
        StorageType::S3 => {
            let bucket = config
                .bucket
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires bucket"))?;
            let region = config
                .region
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires region"))?;
            let access_key = config
                .access_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires accessKey"))?;
            let secret_key = config
                .secret_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires secretKey"))?;
            tracing::info!("初始化S3存储: bucket={}, region={}", bucket, region);
            s3::build_operator(
                bucket,
                region,
                access_key,
                secret_key,
                config.endpoint.as_deref(),
                config.prefix.as_deref(),
            )?
        }
        StorageType::WebDav => {
            let endpoint = config
                .endpoint
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV storage requires endpoint"))?;
            let username = config
                .username
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV storage requires username"))?;
            let password = config
                .password
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV storage requires password"))?;
            tracing::info!("创建WebDAV存储: endpoint={}, root={:?}", endpoint, config.root);
            webdav::build_operator(endpoint, username, password, config.root.as_deref())?
        }
    };

    let store = OperatorStore::new(operator);
    store.check().await?;
    Ok(Arc::new(store) as Arc<dyn RemoteStore>)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, parent: Option<&str>, kind: EntryKind, trashed: bool) -> RemoteEntry {
        RemoteEntry {
            id: format!("{}-{}", parent.unwrap_or("root"), name),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            kind,
            trashed,
        }
    }

    #[test]
    fn test_query_matching() {
        let query = EntryQuery::children_of(Some("p1"))
            .named("docs")
            .of_kind(EntryKind::Folder);

        assert!(query.matches(&entry("docs", Some("p1"), EntryKind::Folder, false)));
        assert!(!query.matches(&entry("docs", Some("p2"), EntryKind::Folder, false)));
        assert!(!query.matches(&entry("docs", None, EntryKind::Folder, false)));
        assert!(!query.matches(&entry("docs", Some("p1"), EntryKind::File, false)));
        assert!(!query.matches(&entry("docs", Some("p1"), EntryKind::Folder, true)));
        assert!(!query.matches(&entry("Docs", Some("p1"), EntryKind::Folder, false)));
    }

    #[tokio::test]
    async fn test_connect_local_requires_path() {
        let config = RemoteConfig {
            typ: StorageType::Local,
            path: None,
            bucket: None,
            region: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            prefix: None,
            username: None,
            password: None,
            root: None,
            op_timeout_secs: OP_TIMEOUT_SECS,
            io_timeout_secs: IO_TIMEOUT_SECS,
        };
        assert!(connect(&config).await.is_err());
    }
}
