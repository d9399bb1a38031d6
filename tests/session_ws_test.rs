//! 会话集成测试：真实 WebSocket 回环服务

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use bee_session::config::AppConfig;
use bee_session::connection::ConnectionState;
use bee_session::core::{BootGate, Session, SessionError, SessionSnapshot};
use bee_session::plan::PlanStatus;
use bee_session::transport::WsConnector;

type ServerSocket = WebSocketStream<TcpStream>;

/// 启动回环服务，每个握手成功的连接都交给测试
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                if tx.send(ws).is_err() {
                    break;
                }
            }
        }
    });
    (format!("ws://{}/ws/chat", addr), rx)
}

fn config_for(url: String) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.session.url = url;
    cfg.reconnect.base_delay_ms = 200;
    cfg.reconnect.max_delay_ms = 1000;
    cfg.boot.timeout_secs = 5;
    cfg
}

async fn wait_for(
    session: &Session,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = session.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("snapshot condition not reached")
        .expect("session closed")
        .clone();
    snapshot
}

async fn next_text(ws: &mut ServerSocket) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame from client")
            .expect("client went away")
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn push(ws: &mut ServerSocket, frame: &str) {
    ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_boot_conversation_and_plan_over_websocket() {
    let (url, mut accepted) = spawn_server().await;
    let cfg = config_for(url);
    let mut session = Session::start(&cfg, Arc::new(WsConnector::new()));

    BootGate::from_config(&cfg.boot)
        .wait(session.subscribe_connection())
        .await
        .unwrap();
    let mut server = accepted.recv().await.unwrap();
    assert!(session.is_connected());

    session.send_message("open spotify and play jazz").unwrap();
    let frame = next_text(&mut server).await;
    assert_eq!(frame["kind"], "message");
    assert_eq!(frame["payload"], "open spotify and play jazz");

    push(&mut server, r#"{"type":"user","content":"open spotify and play jazz"}"#).await;
    push(&mut server, r#"{"type":"status","status":"processing"}"#).await;
    push(
        &mut server,
        r#"{"type":"plan","event":"started","goal":"play jazz","steps":[{"id":1,"action":"open_app"},{"id":2,"action":"play"}]}"#,
    )
    .await;
    push(&mut server, r#"{"type":"plan","event":"step_update","step":{"id":1,"status":"running"}}"#).await;
    push(&mut server, "garbage").await;

    // 计划帧排在最后时不算忙碌
    let snapshot = wait_for(&session, |s| s.messages.len() == 4).await;
    assert!(!snapshot.is_busy);

    push(&mut server, r#"{"type":"status","status":"processing"}"#).await;
    let snapshot = wait_for(&session, |s| s.messages.len() == 5).await;
    assert!(snapshot.is_busy);
    assert_eq!(snapshot.plan.status, PlanStatus::Executing);
    assert_eq!(snapshot.plan.active_step().map(|s| s.action.as_str()), Some("open_app"));
    // 用户输入只出现一次（服务端回显）
    let users = snapshot
        .messages
        .iter()
        .filter(|m| m.kind_name() == "user")
        .count();
    assert_eq!(users, 1);

    session.stop_execution().unwrap();
    let frame = next_text(&mut server).await;
    assert_eq!(frame["kind"], "control");
    assert_eq!(frame["payload"], "stop");

    push(&mut server, r#"{"type":"status","status":"cancelled"}"#).await;
    let snapshot = wait_for(&session, |s| s.messages.len() == 6).await;
    assert!(!snapshot.is_busy);

    session.disconnect().await;
    assert_eq!(session.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_queued_send_is_flushed_after_reconnect() {
    let (url, mut accepted) = spawn_server().await;
    let cfg = config_for(url);
    let mut session = Session::start(&cfg, Arc::new(WsConnector::new()));

    let mut first = accepted.recv().await.unwrap();
    wait_for(&session, |s| s.is_connected()).await;
    push(&mut first, r#"{"type":"assistant","content":"hello"}"#).await;
    wait_for(&session, |s| s.messages.len() == 1).await;

    first.close(None).await.unwrap();
    drop(first);
    wait_for(&session, |s| !s.is_connected()).await;

    session.send_message("are you there?").unwrap();
    session.send_message("hello?").unwrap();

    let mut second = tokio::time::timeout(Duration::from_secs(5), accepted.recv())
        .await
        .expect("client did not reconnect")
        .unwrap();
    assert_eq!(next_text(&mut second).await["payload"], "are you there?");
    assert_eq!(next_text(&mut second).await["payload"], "hello?");

    let snapshot = wait_for(&session, |s| s.is_connected() && s.queued_commands == 0).await;
    // 日志跨重连保留
    assert_eq!(snapshot.messages.len(), 1);

    session.disconnect().await;
    assert!(matches!(
        session.send_message("late"),
        Err(SessionError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_boot_times_out_without_backend() {
    // 绑定后立即释放端口，保证连接被拒绝
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut cfg = config_for(format!("ws://{}/ws/chat", addr));
    cfg.reconnect.base_delay_ms = 50;
    let mut session = Session::start(&cfg, Arc::new(WsConnector::new()));

    let gate = BootGate::new(Duration::from_millis(300));
    let result = gate.wait(session.subscribe_connection()).await;
    assert!(matches!(result, Err(SessionError::BootTimeout(_))));
    assert!(!session.is_connected());

    session.disconnect().await;
}
