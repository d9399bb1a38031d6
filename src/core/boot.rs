//! 启动门控：等待首次连接成功，超时则进入可重试的启动错误
//!
//! 超时策略叠加在连接管理器之上，不影响其无限重连。

use std::time::Duration;

use tokio::sync::watch;

use super::error::SessionError;
use super::session::Session;
use crate::config::BootSection;
use crate::connection::ConnectionState;

/// 启动流程的外部协作者（如启动画面）
pub trait BootObserver: Send + Sync {
    /// 首次连接成功
    fn boot_complete(&self);

    /// 启动失败，需要用户手动重试
    fn boot_error(&self, reason: &str);
}

/// 首次连接门控
#[derive(Debug, Clone)]
pub struct BootGate {
    timeout: Duration,
}

impl BootGate {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(cfg: &BootSection) -> Self {
        Self::new(cfg.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 等待状态变为 open；可在超时后再次调用以重试
    pub async fn wait(
        &self,
        mut state: watch::Receiver<ConnectionState>,
    ) -> Result<(), SessionError> {
        let ready = async move {
            state
                .wait_for(|s| *s == ConnectionState::Open)
                .await
                .map(|_| ())
        };

        match tokio::time::timeout(self.timeout, ready).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::SessionClosed),
            Err(_) => Err(SessionError::BootTimeout(self.timeout)),
        }
    }

    /// 等待首次连接并通知观察者
    pub async fn run(
        &self,
        session: &Session,
        observer: &dyn BootObserver,
    ) -> Result<(), SessionError> {
        let result = self.wait(session.subscribe_connection()).await;
        match &result {
            Ok(()) => {
                tracing::info!("Boot complete");
                observer.boot_complete();
            }
            Err(e) => {
                tracing::error!("Boot failed: {}", e);
                observer.boot_error(&e.to_string());
            }
        }
        result
    }
}
