//! 有界消息日志：按到达顺序追加，超出保留上限时从最旧一端淘汰

use std::collections::VecDeque;

use super::message::Message;

/// 消息日志
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    cap: usize,
    /// 累计追加条数（含已淘汰的）
    appended: u64,
}

impl MessageLog {
    /// cap 至少为 1，保证最新一条永远不会被淘汰
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            appended: 0,
        }
    }

    /// 追加到尾部，返回被淘汰的条数
    pub fn push(&mut self, message: Message) -> usize {
        self.entries.push_back(message);
        self.appended += 1;
        let mut evicted = 0;
        while self.entries.len() > self.cap {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// 最近 n 条（不足时返回全部）
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &Message> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.entries.iter()
    }

    /// 助手是否忙碌：只看最后一条是否为 processing / cancelling 状态
    pub fn is_busy(&self) -> bool {
        self.last().is_some_and(Message::is_busy_status)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(200)
    }
}
