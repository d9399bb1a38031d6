//! 传输层：把一条实时连接抽象为一对文本帧通道
//!
//! - **Connector**：建立连接的 trait（WebSocket 实现 / Mock 实现）
//! - **Link**：一条已建立的连接；入站帧通道关闭即表示连接断开

mod mock;
mod ws;

pub use mock::{MockConnector, MockServerEnd};
pub use ws::WsConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::core::SessionError;

/// 出站帧写入端（每条为一个 JSON 文本帧）
pub type FrameSender = mpsc::UnboundedSender<String>;

/// 建立连接的抽象
#[async_trait]
pub trait Connector: Send + Sync {
    /// 连接到 url，成功后返回可读写的 Link
    async fn connect(&self, url: &str) -> Result<Link, SessionError>;
}

/// 一条已建立的连接
pub struct Link {
    outbound: FrameSender,
    inbound: mpsc::UnboundedReceiver<String>,
    /// Link 被丢弃时取消底层读写任务
    _guard: Option<DropGuard>,
}

impl Link {
    pub fn new(outbound: FrameSender, inbound: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            outbound,
            inbound,
            _guard: None,
        }
    }

    pub fn with_guard(mut self, guard: DropGuard) -> Self {
        self._guard = Some(guard);
        self
    }

    /// 出站写入端的克隆，交给指令通道使用
    pub fn sender(&self) -> FrameSender {
        self.outbound.clone()
    }

    /// 读取下一条入站帧；None 表示连接已关闭
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }
}
