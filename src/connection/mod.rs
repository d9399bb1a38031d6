//! 连接管理：连接生命周期、指数退避重连、连通性信号

mod backoff;
mod manager;

pub use backoff::Backoff;
pub use manager::{ConnectionEvent, ConnectionManager, ConnectionState};
