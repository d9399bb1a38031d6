//! 核心层：错误类型、会话对象、启动门控

pub mod boot;
pub mod error;
pub mod session;

pub use boot::{BootGate, BootObserver};
pub use error::SessionError;
pub use session::{Session, SessionId, SessionSnapshot};
