use anyhow::Result;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 单条排除规则
#[derive(Debug, Clone)]
enum Pattern {
    /// 精确匹配文件名
    Exact(String),
    /// 含 `*` 的简单通配
    Glob(Regex),
}

/// 路径过滤器
///
/// 相对路径中任一片段等于忽略片段（版本、日志、镜像目录等）即被排除，
/// 文件名匹配任一排除规则也被排除。匹配不区分大小写。
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    ignore_segments: Vec<String>,
    patterns: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(ignore_segments: Vec<String>, exclude_patterns: &[String]) -> Self {
        let patterns = exclude_patterns
            .iter()
            .filter_map(|p| Self::compile(p))
            .collect();
        Self {
            ignore_segments: ignore_segments.into_iter().filter(|s| !s.is_empty()).collect(),
            patterns,
        }
    }

    fn compile(pattern: &str) -> Option<Pattern> {
        let pattern = pattern.to_lowercase();
        if !pattern.contains('*') {
            return Some(Pattern::Exact(pattern));
        }

        let regex_pattern = regex::escape(&pattern).replace("\\*", ".*");
        match Regex::new(&format!("^{}$", regex_pattern)) {
            Ok(re) => Some(Pattern::Glob(re)),
            Err(e) => {
                warn!("无效的排除规则 {:?}: {}", pattern, e);
                None
            }
        }
    }

    /// 相对路径是否包含忽略片段
    pub fn has_ignored_segment(&self, relative: &Path) -> bool {
        relative.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.ignore_segments.iter().any(|s| s.as_str() == name)
            }
            _ => false,
        })
    }

    /// 文件名是否匹配排除规则
    pub fn matches_pattern(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.patterns.iter().any(|p| match p {
            Pattern::Exact(exact) => *exact == name,
            Pattern::Glob(re) => re.is_match(&name),
        })
    }

    /// 检查路径是否应该被排除
    pub fn should_exclude(&self, relative: &Path) -> bool {
        if self.has_ignored_segment(relative) {
            return true;
        }
        relative
            .file_name()
            .map(|n| self.matches_pattern(&n.to_string_lossy()))
            .unwrap_or(false)
    }
}

/// 文件扫描器：列出监控根目录下所有需要处理的普通文件
pub struct FileScanner {
    root: PathBuf,
    filter: Arc<PathFilter>,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>, filter: Arc<PathFilter>) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    /// 扫描并返回绝对路径列表（已排序）
    pub async fn scan(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let filter = self.filter.clone();

        info!("开始扫描: {:?}", root);

        // 使用 spawn_blocking 避免阻塞 async runtime
        let (mut files, excluded) = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let mut excluded = 0usize;

            let walker = WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    // 整个忽略目录直接剪枝
                    match entry.path().strip_prefix(&root) {
                        Ok(rel) => !(entry.file_type().is_dir() && filter.has_ignored_segment(rel)),
                        Err(_) => true,
                    }
                });

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!("跳过无法访问的条目: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                if filter.should_exclude(rel) {
                    excluded += 1;
                    continue;
                }
                files.push(entry.into_path());
            }

            (files, excluded)
        })
        .await?;

        files.sort();
        info!("扫描完成: {} 个文件, {} 个被排除", files.len(), excluded);
        Ok(files)
    }
}
