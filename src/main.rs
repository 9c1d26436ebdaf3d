//! order-desk 控制台
//!
//! 从 stdin 逐行读取用户消息，打印状态行与最终回复。`/reset` 开启新会话，`/quit` 退出。
//! 可选参数：配置文件路径。

use anyhow::Context;
use futures_util::StreamExt;
use order_desk::{
    config::load_config, core::ChatService, observability, transport::Frame,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let service = ChatService::from_config(&cfg).context("Failed to build chat service")?;

    println!(
        "{} console. Type a message, /reset for a new session, /quit to exit.",
        cfg.app.name.as_deref().unwrap_or("order-desk")
    );
    let mut session: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                let id = service.reset(session.as_deref());
                println!("[new session {}]", id);
                session = Some(id);
                continue;
            }
            _ => {}
        }

        let chat = match service.chat(session.clone(), line) {
            Ok(chat) => chat,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };
        if chat.created {
            println!("[session {}]", chat.session_id);
        }
        session = Some(chat.session_id);

        let mut frames = chat.frames;
        while let Some(frame) = frames.next().await {
            match frame {
                Frame::Status { message, .. } => println!("  · {}", message),
                Frame::Chunk { content, .. } => {
                    if let Some(reply) = agent_reply(&content) {
                        println!("agent> {}", reply);
                    }
                }
                Frame::Done => break,
                Frame::Error { error } => {
                    eprintln!("error: {}", error);
                    break;
                }
            }
        }
    }

    service.shutdown();
    Ok(())
}

/// 不带工具调用的 agent / followup 轮次即为给用户的回复
fn agent_reply(content: &Value) -> Option<String> {
    let event = content.get("event")?.as_str()?;
    if event != "agent_event" && event != "followup_event" {
        return None;
    }
    let turn = content.get("turns")?.as_array()?.last()?;
    if turn.get("toolCalls").is_some() {
        return None;
    }
    let text = turn.get("content")?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}
