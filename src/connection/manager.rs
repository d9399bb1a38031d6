//! 连接管理器：单一逻辑连接的生命周期
//!
//! connect 启动后台驱动任务（连接 → 读帧 → 断开 → 退避等待 → 重连），状态通过 watch 通道发布；
//! disconnect 取消驱动任务并等待其退出，保证定时器与连接句柄在任何路径上都被释放。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use crate::transport::{Connector, FrameSender};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// 首次连接中
    Connecting,
    /// 已连接
    Open,
    /// 已关闭（未 connect 或已 disconnect）
    Closed,
    /// 连接断开，等待退避后重连
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// 驱动任务交给会话的事件（按发生顺序）
#[derive(Debug)]
pub enum ConnectionEvent {
    /// 连接建立，附带出站写入端
    Opened(FrameSender),
    /// 一条入站文本帧
    Frame(String),
    /// 连接断开（随后进入重连）
    Closed,
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 连接管理器
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    driver: Option<Driver>,
}

impl ConnectionManager {
    /// 返回管理器与连接事件接收端
    pub fn new(
        connector: Arc<dyn Connector>,
        backoff: Backoff,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            backoff,
            state_tx: Arc::new(state_tx),
            events_tx,
            driver: None,
        };
        (manager, events_rx)
    }

    /// 打开连接；已在连接中或已连接时为空操作
    pub fn connect(&mut self, url: &str) {
        if let Some(driver) = &self.driver {
            if !driver.handle.is_finished() {
                tracing::debug!("connect({}) ignored, connection already {}", url, self.state());
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            url.to_string(),
            Arc::clone(&self.connector),
            self.backoff.clone(),
            Arc::clone(&self.state_tx),
            self.events_tx.clone(),
            cancel.clone(),
        ));
        self.driver = Some(Driver { cancel, handle });
    }

    /// 关闭连接并取消待触发的重连；可重复调用
    pub async fn disconnect(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
            if let Err(e) = driver.handle.await {
                tracing::warn!("Connection driver ended abnormally: {}", e);
            }
            tracing::info!("Disconnected");
        }
        self.state_tx.send_replace(ConnectionState::Closed);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// 订阅状态变化（用于 UI 横幅或启动门控）
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
        }
    }
}

async fn drive(
    url: String,
    connector: Arc<dyn Connector>,
    mut backoff: Backoff,
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    state.send_replace(ConnectionState::Connecting);

    'outer: loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break 'outer,
            result = connector.connect(&url) => result,
        };

        match attempt {
            Ok(mut link) => {
                backoff.reset();
                state.send_replace(ConnectionState::Open);
                tracing::info!("Connected to {}", url);

                if events.send(ConnectionEvent::Opened(link.sender())).is_err() {
                    break 'outer;
                }

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'outer,
                        frame = link.recv() => match frame {
                            Some(text) => {
                                if events.send(ConnectionEvent::Frame(text)).is_err() {
                                    break 'outer;
                                }
                            }
                            None => break,
                        },
                    }
                }

                tracing::warn!("Connection to {} lost", url);
                if events.send(ConnectionEvent::Closed).is_err() {
                    break 'outer;
                }
            }
            Err(e) => {
                tracing::warn!("Connect attempt {} failed: {}", backoff.attempt() + 1, e);
            }
        }

        state.send_replace(ConnectionState::Reconnecting);
        let delay = backoff.next_delay();
        tracing::debug!("Reconnecting in {:?}", delay);

        tokio::select! {
            _ = cancel.cancelled() => break 'outer,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    state.send_replace(ConnectionState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::transport::MockConnector;

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_emits_event() {
        let (connector, mut accepted) = MockConnector::new();
        let (mut manager, mut events) =
            ConnectionManager::new(Arc::new(connector), fast_backoff());
        assert_eq!(manager.state(), ConnectionState::Closed);

        manager.connect("ws://test/ws/chat");
        let server = accepted.recv().await.unwrap();

        assert!(matches!(events.recv().await, Some(ConnectionEvent::Opened(_))));
        assert!(manager.is_connected());

        server.push(r#"{"type":"assistant","content":"hi"}"#);
        match events.recv().await {
            Some(ConnectionEvent::Frame(text)) => assert!(text.contains("assistant")),
            other => panic!("unexpected event: {:?}", other),
        }

        drop(server);
        assert!(matches!(events.recv().await, Some(ConnectionEvent::Closed)));
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_is_noop() {
        let (connector, mut accepted) = MockConnector::new();
        let handle = connector.clone();
        let (mut manager, _events) = ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        let _server = accepted.recv().await.unwrap();
        manager.connect("ws://test/ws/chat");
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.attempt_count().await, 1);
        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_attempts_back_off_up_to_cap() {
        let (connector, _accepted) = MockConnector::new();
        connector.set_refuse(true);
        let handle = connector.clone();
        let (mut manager, _events) = ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert!(!manager.is_connected());

        let times = handle.attempt_times().await;
        assert!(times.len() > 6, "expected repeated attempts, got {}", times.len());
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        // 计时器按毫秒取整，允许 1ms 误差
        let slack = Duration::from_millis(1);
        for pair in gaps.windows(2) {
            assert!(pair[1] + slack >= pair[0], "delay decreased: {:?}", gaps);
        }
        assert!(gaps.iter().all(|g| *g <= Duration::from_millis(1000) + slack));
        assert!(gaps[0] >= Duration::from_millis(100));

        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_closes_keep_retrying_from_base_delay() {
        // 丢弃 accepted 端：每次连接成功后立即断开
        let (connector, accepted) = MockConnector::new();
        drop(accepted);
        let handle = connector.clone();
        let (mut manager, mut events) =
            ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        tokio::time::sleep(Duration::from_millis(550)).await;

        let times = handle.attempt_times().await;
        assert!(times.len() >= 5);
        for w in times.windows(2) {
            let gap = w[1] - w[0];
            assert!(gap >= Duration::from_millis(100) && gap <= Duration::from_millis(101));
        }

        assert!(matches!(events.recv().await, Some(ConnectionEvent::Opened(_))));
        assert!(matches!(events.recv().await, Some(ConnectionEvent::Closed)));
        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (connector, _accepted) = MockConnector::new();
        connector.set_refuse(true);
        let handle = connector.clone();
        let (mut manager, _events) = ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.attempt_count().await, 1);

        manager.disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(handle.attempt_count().await, 1);
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_pending_connect() {
        let (connector, _accepted) = MockConnector::new();
        connector.set_hang(true);
        let handle = connector.clone();
        let (mut manager, mut events) =
            ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.attempt_count().await, 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        tokio::time::timeout(Duration::from_secs(1), manager.disconnect())
            .await
            .expect("disconnect blocked on a pending connect");
        assert_eq!(manager.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.attempt_count().await, 1);
        // 从未建立连接，不应有任何事件
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect() {
        let (connector, mut accepted) = MockConnector::new();
        let (mut manager, _events) = ConnectionManager::new(Arc::new(connector), fast_backoff());

        manager.connect("ws://test/ws/chat");
        let _first = accepted.recv().await.unwrap();
        manager.disconnect().await;
        assert!(!manager.is_connected());

        manager.connect("ws://test/ws/chat");
        let _second = accepted.recv().await.unwrap();
        let mut state = manager.subscribe();
        state.wait_for(|s| *s == ConnectionState::Open).await.unwrap();
        assert!(manager.is_connected());
        manager.disconnect().await;
    }
}
