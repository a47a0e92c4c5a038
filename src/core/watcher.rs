//! 文件变化来源
//!
//! `ChangeSource` 产出一个无界的事件流。默认实现基于 `notify` 的轮询监控，
//! 跨文件系统（网络盘、容器挂载）更可靠；也可切换为系统原生通知。

use crate::config::WatchMode;
use anyhow::Result;
use futures::{Stream, StreamExt};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// 事件通道容量
const EVENT_BUFFER: usize = 1024;

/// 变化类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// 单个路径的变化事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
        }
    }

    /// 是否可能带来新内容（删除事件不需要处理）
    pub fn has_content(&self) -> bool {
        matches!(self.kind, ChangeKind::Created | ChangeKind::Modified)
    }
}

pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// 变化来源抽象
pub trait ChangeSource: Send {
    /// 开始监听，返回的流在被丢弃时停止监听
    fn subscribe(self: Box<Self>) -> Result<ChangeStream>;
}

/// notify 事件类型映射
pub fn map_event_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

/// 基于 notify 的变化来源
pub struct NotifySource {
    root: PathBuf,
    mode: WatchMode,
    poll_interval: Duration,
}

impl NotifySource {
    pub fn new(root: impl Into<PathBuf>, mode: WatchMode, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            mode,
            poll_interval,
        }
    }
}

/// 持有 watcher 的事件流，watcher 随流一起释放
struct WatchStream {
    events: ReceiverStream<ChangeEvent>,
    _watcher: Box<dyn Watcher + Send>,
}

impl Stream for WatchStream {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl ChangeSource for NotifySource {
    fn subscribe(self: Box<Self>) -> Result<ChangeStream> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_BUFFER);

        // 回调运行在 notify 自己的线程上
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(kind) = map_event_kind(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if tx.blocking_send(ChangeEvent { path, kind }).is_err() {
                        // 接收端已关闭
                        return;
                    }
                }
            }
            Err(e) => warn!("文件监控错误: {}", e),
        };

        let mut watcher: Box<dyn Watcher + Send> = match self.mode {
            WatchMode::Poll => Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(self.poll_interval),
            )?),
            WatchMode::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
        };
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        info!(
            "开始监控: {:?} (模式: {:?}, 轮询间隔: {:?})",
            self.root, self.mode, self.poll_interval
        );

        Ok(Box::pin(WatchStream {
            events: ReceiverStream::new(rx),
            _watcher: watcher,
        }))
    }
}

/// 由调用方手动推送事件的来源
pub struct ChannelSource {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChannelSource {
    pub fn new() -> (Self, mpsc::Sender<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { rx }, tx)
    }
}

impl ChangeSource for ChannelSource {
    fn subscribe(self: Box<Self>) -> Result<ChangeStream> {
        Ok(Box::pin(ReceiverStream::new(self.rx)))
    }
}
