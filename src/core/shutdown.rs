//! 停止信号
//!
//! 触发后：全量扫描在当前文件处理完后停下，监控循环不再接收新事件。

use tokio::sync::watch;

/// 发送端，通常由 Ctrl-C 监听任务持有
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// 接收端，可克隆给多个阶段检查
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // 没有接收端时无需通知
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// 永远不会触发的信号
    pub fn never() -> Self {
        let (_, shutdown) = channel();
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待触发；发送端被丢弃且未触发时永远挂起
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiters() {
        let (trigger, shutdown) = channel();
        assert!(!shutdown.is_triggered());

        let mut waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_trigger_before_wait_is_seen() {
        let (trigger, mut shutdown) = channel();
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let mut shutdown = Shutdown::never();
        assert!(!shutdown.is_triggered());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), shutdown.wait())
                .await
                .is_err()
        );
    }
}
