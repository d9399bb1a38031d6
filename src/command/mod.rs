//! 出站指令：消息与控制信号的序列化、排队与冲刷

mod gateway;

pub use gateway::{Command, CommandGateway, CommandKind, Delivery, STOP};
