//! 错误分类
//!
//! 每个流水线阶段返回显式的 `SyncError`，由编排层决定是跳过当前文件还是终止运行。

use std::path::PathBuf;
use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// 文件在处理过程中短暂不可读或被删除，跳过本次事件
    #[error("读取文件失败 {path:?}: {source}")]
    TransientIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 远程客户端不可用（认证失败或未配置），本次运行内禁用上传/下载
    #[error("远程存储不可用")]
    RemoteUnavailable,

    /// 单次远程调用失败，只放弃当前文件的这一步
    #[error("远程操作 {op} 失败: {source}")]
    RemoteOperation {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// 远程调用超时
    #[error("远程操作 {op} 超时 ({secs}s)")]
    Timeout { op: &'static str, secs: u64 },

    /// 版本目录写入失败
    #[error("保存版本失败 {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 镜像目录写入失败
    #[error("写入镜像失败 {path:?}: {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置缺失或格式错误，启动阶段致命
    #[error("配置错误: {0}")]
    Configuration(String),
}

impl SyncError {
    pub fn transient(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransientIo {
            path: path.into(),
            source,
        }
    }

    pub fn remote(op: &'static str, source: anyhow::Error) -> Self {
        Self::RemoteOperation { op, source }
    }

    /// 是否值得由调用方稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::TransientIo { .. })
    }

    /// 是否应终止整个运行（只有配置错误）
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_policy() {
        let timeout = SyncError::Timeout {
            op: "create_file",
            secs: 60,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal_to_run());

        let remote = SyncError::remote("list_entries", anyhow::anyhow!("boom"));
        assert!(!remote.is_retryable());
        assert!(!remote.is_fatal_to_run());

        assert!(!SyncError::RemoteUnavailable.is_retryable());
        assert!(SyncError::Configuration("watchPath".into()).is_fatal_to_run());
    }
}
