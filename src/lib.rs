//! Bee Session - 桌面助手的实时会话层
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话对象（单 actor 持有全部状态）、启动门控
//! - **transport**: 连接器抽象（WebSocket / Mock）
//! - **connection**: 连接生命周期与指数退避重连
//! - **stream**: 入站帧协议、有界消息日志、逐帧处理器
//! - **plan**: 多步骤计划执行状态的归并
//! - **command**: 出站指令的排队与冲刷
//! - **rest**: 非实时的 HTTP 旁路
//! - **observability**: tracing 初始化

pub mod command;
pub mod config;
pub mod connection;
pub mod core;
pub mod observability;
pub mod plan;
pub mod rest;
pub mod stream;
pub mod transport;

pub use crate::core::{BootGate, BootObserver, Session, SessionError, SessionSnapshot};
