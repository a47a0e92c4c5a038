use super::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::path::PathBuf;
use std::time::Duration;

/// 构建本地目录作为远程存储的 operator（备份盘、NAS 挂载点等）
pub fn build_operator(path: &str) -> Result<Operator> {
    use opendal::services::Fs;

    let base_path = PathBuf::from(path);
    if !base_path.exists() {
        std::fs::create_dir_all(&base_path)?;
    }

    let builder = Fs::default().root(path);

    let operator = Operator::new(builder)?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .finish();

    Ok(operator)
}
