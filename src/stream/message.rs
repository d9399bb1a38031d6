//! 入站消息协议定义
//!
//! 每个服务端推送的帧是一个带 `type` 判别字段的 JSON 对象，可选 `timestamp`。
//! 未识别的 `type` 或缺失必填字段都视为解码失败。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SessionError;
use crate::plan::PlanUpdate;

/// 状态消息里的 `status` 取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// 助手正在处理
    Processing,
    /// 正在取消当前执行
    Cancelling,
    Idle,
    Completed,
    Cancelled,
    /// 其他未列出的状态
    #[serde(other)]
    Other,
}

impl StatusKind {
    /// processing / cancelling 视为助手忙碌
    pub fn is_busy(&self) -> bool {
        matches!(self, StatusKind::Processing | StatusKind::Cancelling)
    }
}

/// 通知卡片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCard {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// 来源应用（如 Slack、日历）
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// 搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<String>,
}

/// 文件检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResults {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySection {
    pub heading: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// 结构化摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCard {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<SummarySection>,
}

/// Spotify 播放卡片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifyCard {
    pub track: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub user: String,
    pub text: String,
    #[serde(default)]
    pub ts: Option<String>,
}

/// Slack 频道摘录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackCard {
    pub channel: String,
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
}

/// 事故卡片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCard {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeCard {
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// 消息类型（按 `type` 字段区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// 用户输入（由服务端回显）
    User {
        #[serde(alias = "message")]
        content: String,
    },

    /// 助手回复
    Assistant {
        #[serde(alias = "message")]
        content: String,
    },

    /// 处理状态
    Status {
        status: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// 后端报告的错误
    Error {
        #[serde(alias = "content")]
        message: String,
    },

    /// 计划执行快照 / 增量
    Plan(PlanUpdate),

    Notification(NotificationCard),
    SearchResults(SearchResults),
    FileResults(FileResults),
    Summary(SummaryCard),
    Spotify(SpotifyCard),
    Slack(SlackCard),
    Incident(IncidentCard),
    Youtube(YoutubeCard),
}

/// 日志中的一条消息（追加后不再修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub kind: MessageKind,
    /// 服务端给出的时间（原样保留）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// 本地到达时间
    #[serde(skip_deserializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            timestamp: None,
            received_at: Utc::now(),
        }
    }

    /// 解析一帧 JSON 文本
    pub fn decode(frame: &str) -> Result<Self, SessionError> {
        serde_json::from_str(frame).map_err(|e| SessionError::Decode(e.to_string()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User {
            content: content.into(),
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant {
            content: content.into(),
        })
    }

    pub fn status(status: StatusKind) -> Self {
        Self::new(MessageKind::Status {
            status,
            detail: None,
        })
    }

    /// 是否为表示「助手忙碌」的状态消息
    pub fn is_busy_status(&self) -> bool {
        matches!(&self.kind, MessageKind::Status { status, .. } if status.is_busy())
    }

    pub fn as_plan(&self) -> Option<&PlanUpdate> {
        match &self.kind {
            MessageKind::Plan(update) => Some(update),
            _ => None,
        }
    }

    /// 文本内容（用于终端展示）
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::User { content } | MessageKind::Assistant { content } => Some(content),
            MessageKind::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            MessageKind::User { .. } => "user",
            MessageKind::Assistant { .. } => "assistant",
            MessageKind::Status { .. } => "status",
            MessageKind::Error { .. } => "error",
            MessageKind::Plan(_) => "plan",
            MessageKind::Notification(_) => "notification",
            MessageKind::SearchResults(_) => "search_results",
            MessageKind::FileResults(_) => "file_results",
            MessageKind::Summary(_) => "summary",
            MessageKind::Spotify(_) => "spotify",
            MessageKind::Slack(_) => "slack",
            MessageKind::Incident(_) => "incident",
            MessageKind::Youtube(_) => "youtube",
        }
    }
}
