//! Bee Session - 终端前端
//!
//! 连接后端实时端点，打印新消息、计划进度与连接状态；标准输入每行作为一条用户输入。
//!
//! 运行方式：
//! ```bash
//! cargo run -- [config.toml]
//! ```
//! 输入 `/stop` 取消当前执行，`/quit` 退出。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use bee_session::config::load_config;
use bee_session::connection::ConnectionState;
use bee_session::core::{BootGate, BootObserver, Session, SessionError, SessionSnapshot};
use bee_session::observability;
use bee_session::stream::{Message, MessageKind};
use bee_session::transport::WsConnector;

struct TerminalBoot;

impl BootObserver for TerminalBoot {
    fn boot_complete(&self) {
        println!("● connected");
    }

    fn boot_error(&self, reason: &str) {
        println!("✗ could not reach the assistant backend: {}", reason);
    }
}

fn render(message: &Message) -> String {
    match &message.kind {
        MessageKind::User { content } => format!("you > {}", content),
        MessageKind::Assistant { content } => format!("bee > {}", content),
        MessageKind::Status { status, detail } => match detail {
            Some(detail) => format!("  [{:?}] {}", status, detail),
            None => format!("  [{:?}]", status),
        },
        MessageKind::Error { message } => format!("error: {}", message),
        MessageKind::Plan(_) => String::new(),
        MessageKind::Notification(card) => format!(
            "  🔔 {}{}",
            card.title,
            card.body.as_deref().map(|b| format!(" - {}", b)).unwrap_or_default()
        ),
        MessageKind::Spotify(card) => format!(
            "  ♪ {}{}",
            card.track,
            card.artist.as_deref().map(|a| format!(" · {}", a)).unwrap_or_default()
        ),
        _ => format!("  <{}>", message.kind_name()),
    }
}

/// 打印快照中新出现的内容，返回新的游标
fn print_updates(
    snapshot: &SessionSnapshot,
    last_appended: u64,
    last_connection: &mut ConnectionState,
    last_progress: &mut Option<(String, usize)>,
) -> u64 {
    if snapshot.connection != *last_connection {
        match snapshot.connection {
            ConnectionState::Open => println!("● connected"),
            ConnectionState::Reconnecting => println!("○ disconnected, reconnecting..."),
            _ => {}
        }
        *last_connection = snapshot.connection;
    }

    let appended = snapshot.messages.appended();
    let fresh = (appended - last_appended) as usize;
    for message in snapshot.messages.tail(fresh) {
        let line = render(message);
        if !line.is_empty() {
            println!("{}", line);
        }
    }

    let plan = &snapshot.plan;
    let progress = (plan.goal.clone(), plan.completed_steps());
    if plan.total_steps() > 0 && last_progress.as_ref() != Some(&progress) {
        let active = plan
            .active_step()
            .map(|s| format!(" · {}", s.action))
            .unwrap_or_default();
        println!(
            "  plan: {} [{}/{} {:.0}%]{}",
            plan.goal,
            plan.completed_steps(),
            plan.total_steps(),
            plan.progress_percentage(),
            active
        );
        *last_progress = Some(progress);
    }

    appended
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init("bee_session=warn");

    let cfg = load_config(std::env::args().nth(1).map(PathBuf::from))?;
    let mut session = Session::start(&cfg, Arc::new(WsConnector::new()));
    let gate = BootGate::from_config(&cfg.boot);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    // 启动门控：超时后等待用户回车重试
    loop {
        match gate.run(&session, &TerminalBoot).await {
            Ok(()) => break,
            Err(SessionError::BootTimeout(_)) => {
                println!("press Enter to retry, Ctrl+D to quit");
                if lines.next_line().await?.is_none() {
                    session.disconnect().await;
                    return Ok(());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut cursor = 0;
        let mut connection = ConnectionState::Open;
        let mut progress = None;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            cursor = print_updates(&snapshot, cursor, &mut connection, &mut progress);
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => continue,
                    "/quit" => break,
                    "/stop" => session.stop_execution()?,
                    text => session.send_message(text)?,
                }
            }
        }
    }

    session.disconnect().await;
    printer.await.ok();
    Ok(())
}
