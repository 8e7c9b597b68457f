//! Parley - 流式对话编排器
//!
//! 入口：初始化日志、装配编排器，在终端上运行逐行对话。
//! 命令：/clear 清空记忆，/history 查看历史，/quit 退出。

use std::io::Write;

use anyhow::Context;
use parley::core::{create_orchestrator_builder, FirstOutputCallback, TurnEvent};
use parley::memory::Role;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley::observability::init();

    let config_path = std::env::args().nth(1).map(Into::into);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TurnEvent>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    let mut orchestrator = create_orchestrator_builder(config_path)
        .build()
        .await
        .context("Failed to create orchestrator")?
        .with_event_tx(event_tx);

    // 流式输出：文本写 stdout，推理与工具进度写 stderr
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                TurnEvent::TextChunk { text } => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::ThoughtChunk { text } => eprint!("\x1b[2m{text}\x1b[0m"),
                TurnEvent::ToolCall { name, args, .. } => eprintln!("\n[tool] {name} {args}"),
                TurnEvent::ToolResult { success, .. } => {
                    eprintln!("[tool] {}", if success { "ok" } else { "failed" })
                }
                TurnEvent::Error { text } => eprintln!("\n[error] {text}"),
                TurnEvent::Done => {
                    println!();
                    let _ = done_tx.send(());
                }
                TurnEvent::Phase { .. } | TurnEvent::Intent { .. } => {}
            }
        }
    });

    println!(
        "parley ready ({} messages restored). /clear /history /quit",
        orchestrator.history().len()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                match orchestrator.clear().await {
                    Ok(()) => println!("memory cleared"),
                    Err(e) => eprintln!("[error] {e}"),
                }
                continue;
            }
            "/history" => {
                for msg in orchestrator.history() {
                    let who = match msg.role {
                        Role::User => "you",
                        Role::Assistant => "parley",
                        Role::Tool => "tool",
                    };
                    println!("[{who}] {}", msg.content);
                }
                continue;
            }
            _ => {}
        }

        eprint!("thinking...");
        let clear_indicator: FirstOutputCallback = Box::new(|| eprint!("\r           \r"));
        orchestrator
            .handle_turn(input, Vec::new(), Some(clear_indicator))
            .await;
        let _ = done_rx.recv().await;
    }

    Ok(())
}
