//! Mock 连接器（用于测试与离线演示，无需后端）
//!
//! 每次 connect 都会记录一次尝试时间；接受连接时把「服务端」一侧通过通道交给调用方，
//! 调用方可推送入站帧、读取出站帧，丢弃 MockServerEnd 即模拟服务端断开。
//! 挂起模式下 connect 永不返回，用于模拟握手卡住的连接。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use super::{Connector, Link};
use crate::core::SessionError;

/// 一条 Mock 连接的服务端一侧
pub struct MockServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockServerEnd {
    /// 向客户端推送一条入站帧；客户端已断开时返回 false
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }

    /// 读取客户端写出的下一条帧
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// 非阻塞读取，用于断言「没有写出」
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

struct MockState {
    attempts: Mutex<Vec<Instant>>,
    refuse: AtomicBool,
    hang: AtomicBool,
    servers: mpsc::UnboundedSender<MockServerEnd>,
}

/// 可编排的连接器
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// 返回连接器与「已接受连接」的接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(MockState {
                attempts: Mutex::new(Vec::new()),
                refuse: AtomicBool::new(false),
                hang: AtomicBool::new(false),
                servers,
            }),
        };
        (connector, accepted)
    }

    /// 设置为拒绝连接（模拟网络不可达）
    pub fn set_refuse(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// 设置为挂起：之后的 connect 记录尝试后永不完成
    pub fn set_hang(&self, hang: bool) {
        self.state.hang.store(hang, Ordering::SeqCst);
    }

    /// 已发生的连接尝试次数
    pub async fn attempt_count(&self) -> usize {
        self.state.attempts.lock().await.len()
    }

    /// 每次连接尝试的时间点（配合 tokio 暂停时钟断言退避间隔）
    pub async fn attempt_times(&self) -> Vec<Instant> {
        self.state.attempts.lock().await.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Link, SessionError> {
        self.state.attempts.lock().await.push(Instant::now());

        if self.state.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Connect(format!("{}: connection refused", url)));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        // 没有人接收服务端一侧时，连接会立即关闭
        let _ = self.state.servers.send(MockServerEnd {
            to_client,
            from_client,
        });

        Ok(Link::new(outbound, inbound))
    }
}
