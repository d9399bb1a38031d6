//! 会话层错误类型
//!
//! 连接失败只进入退避重连，解码失败只记日志并丢弃；真正交给调用方处理的只有启动超时与会话已关闭。

use std::time::Duration;

use thiserror::Error;

/// 实时会话层可能出现的错误（连接、传输、解码、启动超时、配置等）
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Frame decode error: {0}")]
    Decode(String),

    /// 首次连接未在限定时间内完成，需要用户手动重试
    #[error("Boot timed out after {0:?}")]
    BootTimeout(Duration),

    /// 会话已 disconnect，句柄不再可用
    #[error("Session closed")]
    SessionClosed,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(String),
}
