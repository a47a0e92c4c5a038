//! 备份通知
//!
//! 通知失败只记录日志，不影响备份流程。

use crate::config::NotificationConfig;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 单次通知请求超时
const NOTIFY_TIMEOUT_SECS: u64 = 10;

/// 通知发送抽象
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// 根据配置创建通知器：配置了 webhook 就走 HTTP，否则只写日志
pub fn from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url, &config.subject)?)),
        None => Ok(Arc::new(LogNotifier::new(&config.subject))),
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    message: &'a str,
}

/// 以 JSON `{subject, message}` POST 到 webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    subject: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, subject: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            subject: subject.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                subject: &self.subject,
                message,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("通知接口返回 {}", resp.status());
        }
        Ok(())
    }
}

/// 只写日志的通知器
pub struct LogNotifier {
    subject: String,
}

impl LogNotifier {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        info!("[{}] {}", self.subject, message);
        Ok(())
    }
}

/// 记录所有消息，测试用
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        let n = Self::default();
        n.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        n
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            bail!("通知失败");
        }
        Ok(())
    }
}
