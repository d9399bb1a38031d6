//! WebSocket 连接器（tokio-tungstenite）

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use super::{Connector, Link};
use crate::core::SessionError;

/// 通过 WebSocket 连接后端实时端点
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, SessionError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Connect(format!("{}: {}", url, e)))?;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let token = CancellationToken::new();

        let writer_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_token.cancelled() => break,
                    frame = out_rx.recv() => match frame {
                        Some(text) => {
                            if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                                tracing::warn!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = ws_tx.close().await;
            writer_token.cancel();
        });

        let reader_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_token.cancelled() => break,
                    msg = ws_rx.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if in_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if in_tx.send(text).is_err() {
                                    break;
                                }
                            }
                            Err(_) => tracing::warn!("Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket receive error: {}", e);
                            break;
                        }
                    },
                }
            }
            reader_token.cancel();
        });

        Ok(Link::new(out_tx, in_rx).with_guard(token.drop_guard()))
    }
}
