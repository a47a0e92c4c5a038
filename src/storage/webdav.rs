use super::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::time::Duration;

/// 构建 WebDAV 存储的 operator
pub fn build_operator(
    endpoint: &str,
    username: &str,
    password: &str,
    root: Option<&str>,
) -> Result<Operator> {
    use opendal::services::Webdav;

    let mut builder = Webdav::default()
        .endpoint(endpoint)
        .username(username)
        .password(password);

    if let Some(r) = root {
        builder = builder.root(r);
    }

    let operator = Operator::new(builder)?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .finish();

    Ok(operator)
}
