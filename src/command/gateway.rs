//! 指令通道：UI 意图 → 出站帧
//!
//! 已连接时立即按 FIFO 写出；未连接时进入队列，连接建立后按原顺序冲刷。
//! 写入失败（连接刚断开）的指令重新回到队首，下次连接时重试。
//! 不做本地回显：用户消息由服务端以 `user` 帧回显后再进入日志。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::SessionError;
use crate::transport::FrameSender;

/// 内置控制指令：取消当前计划执行
pub const STOP: &str = "stop";

/// 出站指令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 对话输入
    Message,
    /// 控制信号（如 stop）
    Control,
}

/// 出站指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: String,
}

impl Command {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Message,
            payload: text.into(),
        }
    }

    pub fn control(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Control,
            payload: name.into(),
        }
    }

    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Transport(e.to_string()))
    }
}

/// submit 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// 指令通道
#[derive(Debug, Default)]
pub struct CommandGateway {
    sink: Option<FrameSender>,
    queue: VecDeque<Command>,
}

impl CommandGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// 连接建立：挂上写入端并冲刷积压，返回写出的条数
    pub fn attach(&mut self, sink: FrameSender) -> usize {
        self.sink = Some(sink);
        let flushed = self.flush();
        if flushed > 0 {
            tracing::debug!("Flushed {} queued commands", flushed);
        }
        flushed
    }

    /// 连接断开：之后的指令进入队列
    pub fn detach(&mut self) {
        self.sink = None;
    }

    /// 提交一条指令：已连接且无积压时立即写出，否则排队
    pub fn submit(&mut self, command: Command) -> Delivery {
        self.queue.push_back(command);
        if self.sink.is_none() {
            tracing::debug!("Command queued while disconnected ({} pending)", self.queue.len());
            return Delivery::Queued;
        }
        self.flush();
        if self.queue.is_empty() {
            Delivery::Sent
        } else {
            Delivery::Queued
        }
    }

    /// 按顺序写出队列中的指令，遇到写入失败即停止
    fn flush(&mut self) -> usize {
        let mut written = 0;
        while let Some(command) = self.queue.pop_front() {
            if !self.write(&command) {
                break;
            }
            written += 1;
        }
        written
    }

    /// 写出一条；失败时断开写入端并把指令放回队首
    fn write(&mut self, command: &Command) -> bool {
        let Some(sink) = &self.sink else {
            self.queue.push_front(command.clone());
            return false;
        };

        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Dropping unencodable command: {}", e);
                return true;
            }
        };

        if sink.send(frame).is_err() {
            tracing::warn!("Write failed, connection already closed; requeueing command");
            self.sink = None;
            self.queue.push_front(command.clone());
            return false;
        }
        true
    }
}
