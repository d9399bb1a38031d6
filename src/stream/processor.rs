//! 消息流处理器：把入站帧解码为 Message 并追加到有界日志
//!
//! 按投递顺序逐帧处理，不做缺口检测或重排；解码失败的帧记录日志后丢弃，不会留下半条记录。

use std::sync::Arc;

use super::history::MessageLog;
use super::message::Message;
use crate::plan::PlanUpdate;

/// 单帧处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// 解码失败，日志未变化
    Dropped,
    /// 已追加
    Appended,
    /// 已追加，且是需要交给计划归并器的 plan 帧
    Plan(PlanUpdate),
}

/// 消息流处理器
#[derive(Debug)]
pub struct StreamProcessor {
    log: Arc<MessageLog>,
    dropped: u64,
}

impl StreamProcessor {
    pub fn new(retention_cap: usize) -> Self {
        Self {
            log: Arc::new(MessageLog::new(retention_cap)),
            dropped: 0,
        }
    }

    /// 处理一帧
    pub fn ingest(&mut self, frame: &str) -> Ingest {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!("Dropping undecodable frame: {} ({} bytes)", e, frame.len());
                return Ingest::Dropped;
            }
        };

        let plan = message.as_plan().cloned();
        let kind = message.kind_name();
        // 外部持有旧快照时会先复制，保证旧快照不变
        let evicted = Arc::make_mut(&mut self.log).push(message);
        tracing::debug!("Appended {} message (evicted {})", kind, evicted);

        match plan {
            Some(update) => Ingest::Plan(update),
            None => Ingest::Appended,
        }
    }

    /// 当前日志快照（廉价克隆）
    pub fn snapshot(&self) -> Arc<MessageLog> {
        Arc::clone(&self.log)
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn is_busy(&self) -> bool {
        self.log.is_busy()
    }

    /// 累计丢弃的帧数
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSISTANT: &str = r#"{"type":"assistant","content":"hello"}"#;

    #[test]
    fn test_same_frame_twice_appends_twice() {
        let mut processor = StreamProcessor::new(200);
        assert_eq!(processor.ingest(ASSISTANT), Ingest::Appended);
        assert_eq!(processor.ingest(ASSISTANT), Ingest::Appended);
        assert_eq!(processor.log().len(), 2);
    }

    #[test]
    fn test_invalid_frames_do_not_touch_log() {
        let mut processor = StreamProcessor::new(200);
        processor.ingest(ASSISTANT);
        let before = processor.snapshot();

        assert_eq!(processor.ingest(r#"{"content":"missing type"}"#), Ingest::Dropped);
        assert_eq!(processor.ingest(r#"{"type":"mystery"}"#), Ingest::Dropped);
        assert_eq!(processor.ingest("{truncated"), Ingest::Dropped);

        assert_eq!(processor.log().len(), 1);
        assert_eq!(processor.dropped_frames(), 3);
        assert!(Arc::ptr_eq(&before, &processor.snapshot()));
    }

    #[test]
    fn test_bounded_log_keeps_last_n() {
        let cap = 200;
        let extra = 37;
        let mut processor = StreamProcessor::new(cap);
        for i in 0..cap + extra {
            processor.ingest(&format!(r#"{{"type":"assistant","content":"m{}"}}"#, i));
        }

        let log = processor.log();
        assert_eq!(log.len(), cap);
        let expected: Vec<String> = (extra..cap + extra).map(|i| format!("m{}", i)).collect();
        let actual: Vec<String> = log.iter().filter_map(|m| m.text()).map(String::from).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_busy_flag_from_last_message() {
        let mut processor = StreamProcessor::new(200);
        processor.ingest(r#"{"type":"status","status":"processing"}"#);
        assert!(processor.is_busy());
        processor.ingest(ASSISTANT);
        assert!(!processor.is_busy());
    }

    #[test]
    fn test_trailing_plan_frame_clears_busy() {
        let mut processor = StreamProcessor::new(200);
        processor.ingest(r#"{"type":"status","status":"processing"}"#);
        processor.ingest(r#"{"type":"plan","event":"step_update","step":{"id":1,"status":"running"}}"#);

        assert!(!processor.is_busy());
        assert!(processor.log().get(0).unwrap().is_busy_status());
        assert_eq!(processor.log().get(1).unwrap().kind_name(), "plan");

        processor.ingest(r#"{"type":"status","status":"cancelling"}"#);
        assert!(processor.is_busy());
    }

    #[test]
    fn test_plan_frames_are_logged_and_routed() {
        let mut processor = StreamProcessor::new(200);
        let result = processor.ingest(r#"{"type":"plan","event":"started","goal":"g","steps":[]}"#);
        assert!(matches!(result, Ingest::Plan(PlanUpdate::Started { .. })));
        assert_eq!(processor.log().len(), 1);
    }

    #[test]
    fn test_held_snapshot_survives_append() {
        let mut processor = StreamProcessor::new(200);
        processor.ingest(ASSISTANT);
        let held = processor.snapshot();
        processor.ingest(ASSISTANT);
        assert_eq!(held.len(), 1);
        assert_eq!(processor.log().len(), 2);
    }
}
