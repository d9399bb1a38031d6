//! 消息流：入站帧协议、有界消息日志、逐帧处理器

mod history;
mod message;
mod processor;

pub use history::MessageLog;
pub use message::{
    FileEntry, FileResults, IncidentCard, Message, MessageKind, NotificationCard, SearchHit,
    SearchResults, SlackCard, SlackMessage, SpotifyCard, StatusKind, SummaryCard, SummarySection,
    YoutubeCard,
};
pub use processor::{Ingest, StreamProcessor};
