//! Tutor - 学习辅导对话命令行
//!
//! 入口：初始化日志与配置，创建引擎、检查点存储与会话中心，然后逐行读取标准输入。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tutor::config::load_config_or_default;
use tutor::core::{
    create_conversation_summary, ConversationEngine, Role, SessionHandle, SessionHub, TurnOutcome,
    TutorError,
};
use tutor::memory::SqliteStateStore;
use tutor::observability::{self, PerformanceMonitor};

const HELP: &str = "命令：/new 新对话  /open <id> 打开已有对话  /list 列出对话  /summary 对话摘要  /health 健康检查  /stats 性能统计  /quit 退出";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config_or_default(config_path);
    let user_id = std::env::var("USER").unwrap_or_else(|_| "local".to_string());

    let monitor = Arc::new(PerformanceMonitor::new());
    let engine = Arc::new(ConversationEngine::from_config(&cfg, monitor.clone()));
    let store = SqliteStateStore::open(&cfg.app.database_path)
        .with_context(|| format!("Failed to open store at {}", cfg.app.database_path.display()))?;
    let hub = SessionHub::new(engine.clone(), Arc::new(store));

    let mut session = hub.open(None, &user_id).await.context("Failed to open conversation")?;
    let mut seen = 0usize;
    println!("{}", cfg.app.name.as_deref().unwrap_or("学习辅导助手"));
    println!("{HELP}");
    println!("对话 ID：{}", session.conversation_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit", _) => break,
            ("/new", _) => {
                hub.close(session.conversation_id()).await;
                session = hub.open(None, &user_id).await?;
                seen = 0;
                println!("已开始新对话：{}", session.conversation_id());
            }
            ("/open", id) if !id.is_empty() => {
                hub.close(session.conversation_id()).await;
                session = hub.open(Some(id.to_string()), &user_id).await?;
                let state = session.snapshot().await?;
                seen = state.messages.len();
                println!("已打开对话 {}（{} 条消息）", state.conversation_id, seen);
            }
            ("/list", _) => {
                for id in hub.conversations().await? {
                    println!("  {id}");
                }
            }
            ("/summary", _) => {
                let state = session.snapshot().await?;
                println!("{}", create_conversation_summary(&state));
            }
            ("/health", _) => {
                let state = session.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&engine.health(&state))?);
            }
            ("/stats", _) => {
                println!("{}", serde_json::to_string_pretty(&monitor.summary())?);
                println!("{}", serde_json::to_string_pretty(&engine.tools().tool_status())?);
            }
            (cmd, _) if cmd.starts_with('/') => println!("{HELP}"),
            _ => seen = run_turn(&session, line, seen).await,
        }
    }

    hub.close(session.conversation_id()).await;
    monitor.log_summary();
    Ok(())
}

/// 执行一轮并打印新增的助手消息；Ctrl+C 取消当前轮
async fn run_turn(session: &SessionHandle, input: &str, seen: usize) -> usize {
    let send = session.send(input);
    tokio::pin!(send);
    let result = tokio::select! {
        r = &mut send => r,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            send.await
        }
    };

    match result {
        Ok(turn) => {
            let messages = &turn.state.messages;
            let start = if messages.len() < seen { 0 } else { seen };
            for message in messages[start..].iter().filter(|m| m.role != Role::User) {
                println!("[{}] {}", message.agent.as_deref().unwrap_or("assistant"), message.content);
            }
            match turn.outcome {
                TurnOutcome::AwaitingInput => println!("（等待您的反馈）"),
                TurnOutcome::Completed => println!("（对话已结束，输入 /new 开始新的对话）"),
            }
            messages.len()
        }
        Err(TutorError::ConversationComplete(_)) => {
            println!("该对话已结束，输入 /new 开始新的对话。");
            seen
        }
        Err(e) => {
            println!("本轮未完成：{e}");
            seen
        }
    }
}
