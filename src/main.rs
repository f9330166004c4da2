//! Scout - 命令行研究助手
//!
//! 入口：加载 .env 与配置、初始化日志、装配运行时，然后逐行读取 stdin 作为提问。
//! 以 `/` 开头的行是命令：/session <id>、/memory、/tools、/evals、/quit。

use anyhow::Context;
use scout::agent::AgentRuntime;
use scout::config::load_config;
use scout::orchestration::{RunContext, RunEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn print_event(ev: &RunEvent) {
    match ev {
        RunEvent::MemoryRecalled { preview } => println!("  [memory] {preview}"),
        RunEvent::Decided { action, detail } => match detail {
            Some(d) => println!("  [decide] {action}: {d}"),
            None => println!("  [decide] {action}"),
        },
        RunEvent::Searched { query, hits } => println!("  [search] {query} ({hits} hits)"),
        RunEvent::Retrieved { documents } => println!("  [rag] {documents} documents"),
        RunEvent::ToolResult { tool, preview } => println!("  [tool] {tool}: {preview}"),
        RunEvent::StepFailed { phase, reason } => println!("  [failed] {phase:?}: {reason}"),
        RunEvent::BudgetExhausted { budget } => {
            println!("  [budget] {budget} cycles used, answering now")
        }
        RunEvent::Phase { .. } | RunEvent::Answer { .. } | RunEvent::Error { .. } => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    scout::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let runtime = AgentRuntime::from_config(&cfg)
        .await
        .context("Failed to build agent runtime")?;

    let mut session = cfg.app.default_session.clone();
    println!("scout ready (session: {session}). Ask a question, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(cmd) = line.strip_prefix('/') {
            let (name, arg) = cmd.split_once(' ').unwrap_or((cmd, ""));
            match name {
                "quit" | "exit" => break,
                "session" if !arg.trim().is_empty() => {
                    session = arg.trim().to_string();
                    println!("switched to session {session}");
                }
                "memory" => println!("{:?}", runtime.memory_stats(&session).await),
                "tools" => {
                    for tool in runtime.refresh_tools().await {
                        println!("  {}: {}", tool.name, tool.description);
                    }
                }
                "evals" => {
                    for e in runtime.evals() {
                        println!(
                            "  {} {} {}ms searches={} rag={} tools={} degraded={} ok={}",
                            e.at, e.session_id, e.latency_ms, e.searches, e.rag_hits, e.tool_calls, e.degraded, e.ok
                        );
                    }
                }
                _ => println!("commands: /session <id>, /memory, /tools, /evals, /quit"),
            }
            continue;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                print_event(&ev);
            }
        });
        let result = runtime
            .run_turn(Some(session.as_str()), line, RunContext::new().with_events(tx))
            .await;
        let _ = printer.await;

        match result {
            Ok(outcome) => {
                println!("\n{}\n", outcome.answer);
                if !outcome.sources.is_empty() {
                    println!("Sources:");
                    for s in &outcome.sources {
                        println!("  - {s}");
                    }
                }
                if outcome.degraded {
                    println!("(answered after exhausting the research budget)");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    runtime.supervisor().cancel_all();
    Ok(())
}
