//! 会话对象：一个应用实例一条连接，显式构造后按引用交给各消费者
//!
//! 内部由一个 actor 任务独占消息日志、计划状态与指令通道，连接事件与出站指令在同一个
//! `select!` 循环里逐个处理，每次处理都完整结束后才处理下一个。
//! 每次变更后通过 watch 通道发布新的不可变快照；UI 只读快照，不直接接触可变状态。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::SessionError;
use crate::command::{Command, CommandGateway, STOP};
use crate::config::AppConfig;
use crate::connection::{Backoff, ConnectionEvent, ConnectionManager, ConnectionState};
use crate::plan::{PlanReconciler, PlanState};
use crate::stream::{Ingest, MessageLog, StreamProcessor};
use crate::transport::Connector;

/// 会话 ID
pub type SessionId = String;

/// UI 可见的会话快照（克隆廉价，内容不可变）
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub messages: Arc<MessageLog>,
    pub plan: Arc<PlanState>,
    /// 最后一条消息是否为 processing / cancelling 状态
    pub is_busy: bool,
    /// 等待连接后发送的指令数
    pub queued_commands: usize,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Open
    }
}

/// 会话句柄
pub struct Session {
    id: SessionId,
    connection: ConnectionManager,
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    actor: Option<JoinHandle<()>>,
}

impl Session {
    /// 创建会话并立即连接到 `cfg.session.url`
    pub fn start(cfg: &AppConfig, connector: Arc<dyn Connector>) -> Self {
        let (mut connection, events) =
            ConnectionManager::new(connector, Backoff::from_config(&cfg.reconnect));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            processor: StreamProcessor::new(cfg.session.retention_cap),
            reconciler: PlanReconciler::new(),
            gateway: CommandGateway::new(),
            state_rx: connection.subscribe(),
            snapshots: watch::channel(SessionSnapshot {
                connection: ConnectionState::Closed,
                messages: Arc::new(MessageLog::new(cfg.session.retention_cap)),
                plan: Arc::new(PlanState::default()),
                is_busy: false,
                queued_commands: 0,
            })
            .0,
        };
        let snapshots = actor.snapshots.subscribe();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actor.run(events, commands_rx, cancel.clone()));

        connection.connect(&cfg.session.url);

        let id = format!("session_{}", uuid::Uuid::new_v4());
        tracing::info!("Session {} started against {}", id, cfg.session.url);

        Self {
            id,
            connection,
            commands: commands_tx,
            snapshots,
            cancel,
            actor: Some(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 发送对话输入；未连接时排队，连接后按顺序发出
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.submit(Command::message(text))
    }

    /// 发送控制指令（如 "stop"）
    pub fn send_command(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.submit(Command::control(name))
    }

    /// 取消当前计划执行
    pub fn stop_execution(&self) -> Result<(), SessionError> {
        self.send_command(STOP)
    }

    fn submit(&self, command: Command) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::SessionClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// 订阅连接状态（启动门控、断线横幅）
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// 最新快照
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// 订阅快照变化；会话关闭后 `changed()` 返回错误
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// 关闭会话：先停止 actor（之后不再有任何状态变更或通知），再关闭连接
    pub async fn disconnect(&mut self) {
        self.cancel.cancel();
        if let Some(actor) = self.actor.take() {
            if let Err(e) = actor.await {
                tracing::warn!("Session actor ended abnormally: {}", e);
            }
        }
        self.connection.disconnect().await;
        tracing::info!("Session {} closed", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionActor {
    processor: StreamProcessor,
    reconciler: PlanReconciler,
    gateway: CommandGateway,
    state_rx: watch::Receiver<ConnectionState>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
            }
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened(sink) => {
                self.gateway.attach(sink);
            }
            ConnectionEvent::Frame(text) => match self.processor.ingest(&text) {
                Ingest::Dropped => return,
                Ingest::Appended => {}
                Ingest::Plan(update) => {
                    self.reconciler.apply(update);
                }
            },
            ConnectionEvent::Closed => self.gateway.detach(),
        }
        self.publish();
    }

    fn on_command(&mut self, command: Command) {
        self.gateway.submit(command);
        self.publish();
    }

    fn publish(&self) {
        let connection = *self.state_rx.borrow();
        self.snapshots.send_replace(SessionSnapshot {
            connection,
            messages: self.processor.snapshot(),
            plan: self.reconciler.snapshot(),
            is_busy: self.processor.is_busy(),
            queued_commands: self.gateway.queued_len(),
        });
    }
}
