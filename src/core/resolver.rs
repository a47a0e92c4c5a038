//! 远程路径解析 - 把本地相对路径映射到远程父文件夹，并缓存文件夹标识

use crate::core::engine::remote_call;
use crate::error::SyncResult;
use crate::storage::{EntryId, EntryKind, EntryQuery, RemoteStore};
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// (文件夹名, 父文件夹) -> 文件夹标识
type FolderKey = (String, Option<EntryId>);

/// 远程路径解析器
///
/// 每个 key 对应一个 `OnceCell`：并发解析同一文件夹时只有一个调用方真正查询/创建，
/// 其余等待并得到同一个标识。失败不会写入缓存，重试会从失败的那一级继续。
/// 运行期间缓存不会失效（假设远程目录结构不被外部修改）。
pub struct RemotePathResolver {
    store: Arc<dyn RemoteStore>,
    cache: Mutex<HashMap<FolderKey, Arc<OnceCell<EntryId>>>>,
    op_timeout: Duration,
}

impl RemotePathResolver {
    pub fn new(store: Arc<dyn RemoteStore>, op_timeout: Duration) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            op_timeout,
        }
    }

    /// 解析相对路径所在的远程文件夹，文件位于根目录时返回 `None`
    pub async fn resolve(&self, relative_path: &Path) -> SyncResult<Option<EntryId>> {
        let mut parent: Option<EntryId> = None;

        let Some(dir) = relative_path.parent() else {
            return Ok(None);
        };

        for component in dir.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            let id = self.get_or_create_folder(&name, parent.as_deref()).await?;
            parent = Some(id);
        }

        Ok(parent)
    }

    /// 查找或创建父文件夹下的同名文件夹
    pub async fn get_or_create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> SyncResult<EntryId> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache
                .entry((name.to_string(), parent.map(str::to_string)))
                .or_default()
                .clone()
        };

        let id = cell
            .get_or_try_init(|| self.lookup_or_create(name, parent))
            .await?;

        Ok(id.clone())
    }

    async fn lookup_or_create(&self, name: &str, parent: Option<&str>) -> SyncResult<EntryId> {
        let query = EntryQuery::children_of(parent)
            .named(name)
            .of_kind(EntryKind::Folder);

        let existing = remote_call(
            "list_entries",
            self.op_timeout,
            self.store.list_entries(&query),
        )
        .await?;

        if let Some(folder) = existing.into_iter().next() {
            debug!("找到远程文件夹: {} -> {}", name, folder.id);
            return Ok(folder.id);
        }

        let id = remote_call(
            "create_folder",
            self.op_timeout,
            self.store.create_folder(name, parent),
        )
        .await?;
        info!("已创建远程文件夹: {} ({})", name, id);
        Ok(id)
    }

    /// 已缓存的文件夹数量
    pub fn cached_folders(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}
