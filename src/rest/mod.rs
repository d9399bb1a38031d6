//! REST 旁路：与实时连接无关的请求/响应调用
//!
//! 语音转写上传、在文件管理器中打开文件、读写后端配置。结果不进入会话状态机，
//! 只有转写文本会通过 `Session::send_message` 作为普通输入发出。

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::RestSection;
use crate::core::{Session, SessionError};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// 后端 HTTP 客户端
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(cfg: &RestSection) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| SessionError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 上传录音并返回转写文本
    pub async fn transcribe(&self, audio: Vec<u8>, mime: &str) -> Result<String, SessionError> {
        let response = self
            .http
            .post(self.url("/api/transcribe"))
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(audio)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::Http(format!("transcribe failed: {}", e)))?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Http(format!("invalid transcription response: {}", e)))?;
        Ok(body.text)
    }

    /// 请求后端在系统文件管理器中显示文件
    pub async fn reveal_file(&self, path: &str) -> Result<(), SessionError> {
        self.http
            .post(self.url("/api/reveal"))
            .json(&json!({ "path": path }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::Http(format!("reveal failed: {}", e)))?;
        Ok(())
    }

    pub async fn get_config(&self) -> Result<serde_json::Value, SessionError> {
        self.http
            .get(self.url("/api/config"))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::Http(format!("config read failed: {}", e)))?
            .json()
            .await
            .map_err(|e| SessionError::Http(format!("invalid config response: {}", e)))
    }

    pub async fn put_config(&self, value: &serde_json::Value) -> Result<(), SessionError> {
        self.http
            .post(self.url("/api/config"))
            .json(value)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::Http(format!("config write failed: {}", e)))?;
        Ok(())
    }
}

/// 转写录音，非空结果作为用户输入发出；返回转写文本
pub async fn transcribe_and_send(
    rest: &RestClient,
    session: &Session,
    audio: Vec<u8>,
    mime: &str,
) -> Result<String, SessionError> {
    let text = rest.transcribe(audio, mime).await?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        tracing::debug!("Empty transcription, nothing sent");
    } else {
        session.send_message(trimmed)?;
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 只响应一次的最小 HTTP 服务
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_joining() {
        let client = RestClient::new(&RestSection {
            base_url: "http://localhost:8000/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.url("/api/config"), "http://localhost:8000/api/config");
        assert_eq!(client.url("api/reveal"), "http://localhost:8000/api/reveal");
    }

    #[tokio::test]
    async fn test_get_config() {
        let base_url = serve_once(r#"{"profile":{"name":"Ada"}}"#).await;
        let client = RestClient::new(&RestSection {
            base_url,
            timeout_secs: 5,
        })
        .unwrap();

        let config = client.get_config().await.unwrap();
        assert_eq!(config["profile"]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        let client = RestClient::new(&RestSection {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
        })
        .unwrap();
        assert!(matches!(client.reveal_file("/tmp/x").await, Err(SessionError::Http(_))));
    }
}
