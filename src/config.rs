//! 应用配置模块

use crate::error::{SyncError, SyncResult};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件位置（相对于工作目录）
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// 监控的根目录
    pub watch_path: PathBuf,
    #[serde(default)]
    pub versions: VersionConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// 远程存储配置，缺省时只做本地版本备份
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// 版本目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConfig {
    #[serde(default = "default_versions_dir")]
    pub dir: PathBuf,
    /// 每个文件名保留的版本数，0 表示不清理
    #[serde(default)]
    pub keep_per_file: usize,
}

fn default_versions_dir() -> PathBuf {
    PathBuf::from("versions")
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            dir: default_versions_dir(),
            keep_per_file: 0,
        }
    }
}

/// 本地镜像配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default = "default_mirror_dir")]
    pub dir: PathBuf,
}

fn default_mirror_dir() -> PathBuf {
    PathBuf::from("drive_mirror")
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            dir: default_mirror_dir(),
        }
    }
}

/// 监控方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// 定时轮询，跨文件系统最稳妥
    Poll,
    /// 系统原生通知
    Native,
}

/// 文件监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    #[serde(default = "default_watch_mode")]
    pub mode: WatchMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// 并发处理事件的 worker 数
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 额外忽略的路径片段（版本、日志、镜像目录会自动加入）
    #[serde(default)]
    pub ignore_segments: Vec<String>,
    /// 文件名排除规则（简单 glob）
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_watch_mode() -> WatchMode {
    WatchMode::Poll
}

fn default_poll_interval() -> u64 {
    10
}

fn default_workers() -> usize {
    2
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "*.tmp".to_string(),
        "*.swp".to_string(),
        "~*".to_string(),
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
    ]
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: default_watch_mode(),
            poll_interval_secs: default_poll_interval(),
            workers: default_workers(),
            ignore_segments: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// 远程存储类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    S3,
    WebDav,
    /// 进程内存储，用于演练
    Memory,
}

/// 远程存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type")]
    pub typ: StorageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// 元数据调用超时（秒）
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,
    /// 文件内容上传/下载超时（秒）
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
}

fn default_op_timeout() -> u64 {
    crate::storage::OP_TIMEOUT_SECS
}

fn default_io_timeout() -> u64 {
    crate::storage::IO_TIMEOUT_SECS
}

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    /// Webhook 地址，为空时只写日志
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_subject() -> String {
    "Backup Notification".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            subject: default_subject(),
        }
    }
}

impl AppConfig {
    /// 从配置文件加载
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("无法读取配置文件 {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }

    /// 解析 JSON 配置
    pub fn from_json(content: &str) -> SyncResult<Self> {
        let config: AppConfig = serde_json::from_str(content)
            .map_err(|e| SyncError::Configuration(format!("配置格式错误: {}", e)))?;

        if config.watch_path.as_os_str().is_empty() {
            return Err(SyncError::Configuration("watchPath 不能为空".to_string()));
        }
        if config.watcher.workers == 0 {
            return Err(SyncError::Configuration("watcher.workers 必须大于 0".to_string()));
        }

        Ok(config)
    }

    /// 需要忽略的路径片段：程序自身产生的目录 + 用户配置
    pub fn ignore_segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = [&self.versions.dir, &self.log.dir, &self.mirror.dir]
            .iter()
            .filter_map(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        for segment in &self.watcher.ignore_segments {
            if !segments.contains(segment) {
                segments.push(segment.clone());
            }
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_json(r#"{ "watchPath": "/data" }"#).unwrap();

        assert_eq!(config.watch_path, PathBuf::from("/data"));
        assert_eq!(config.versions.dir, PathBuf::from("versions"));
        assert_eq!(config.versions.keep_per_file, 0);
        assert_eq!(config.mirror.dir, PathBuf::from("drive_mirror"));
        assert_eq!(config.watcher.mode, WatchMode::Poll);
        assert_eq!(config.watcher.poll_interval_secs, 10);
        assert_eq!(config.watcher.workers, 2);
        assert!(config.remote.is_none());
        assert!(config.notification.webhook_url.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_json(
            r#"{
                "watchPath": "./docs",
                "versions": { "dir": "/var/backup/versions", "keepPerFile": 5 },
                "watcher": { "mode": "native", "workers": 4, "ignoreSegments": [".git"] },
                "remote": {
                    "type": "webdav",
                    "endpoint": "https://dav.example.com",
                    "username": "u",
                    "password": "p"
                },
                "notification": { "webhookUrl": "https://hooks.example.com/x" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.versions.keep_per_file, 5);
        assert_eq!(config.watcher.mode, WatchMode::Native);
        assert_eq!(config.watcher.workers, 4);
        let remote = config.remote.unwrap();
        assert_eq!(remote.typ, StorageType::WebDav);
        assert_eq!(remote.op_timeout_secs, crate::storage::OP_TIMEOUT_SECS);
        assert_eq!(remote.io_timeout_secs, crate::storage::IO_TIMEOUT_SECS);
        assert_eq!(
            config.notification.webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
    }

    #[test]
    fn test_ignore_segments_include_own_dirs() {
        let config = AppConfig::from_json(
            r#"{
                "watchPath": "/data",
                "versions": { "dir": "/var/backup/versions" },
                "watcher": { "ignoreSegments": [".git", "logs"] }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.ignore_segments(),
            vec!["versions", "logs", "drive_mirror", ".git"]
        );
    }

    #[test]
    fn test_invalid_config_is_configuration_error() {
        assert!(matches!(
            AppConfig::from_json("{}"),
            Err(SyncError::Configuration(_))
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{ "watchPath": "/d", "watcher": { "workers": 0 } }"#),
            Err(SyncError::Configuration(_))
        ));
        assert!(matches!(
            AppConfig::load(Path::new("/nonexistent/config.json")),
            Err(SyncError::Configuration(_))
        ));
    }
}
