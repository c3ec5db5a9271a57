//! Tailor - 简历修订工作流
//!
//! 入口：初始化日志与配置，组装编排器与会话存储，运行终端交互循环。
//!
//! 用法：
//! - `tailor [resume.json]`：新建会话（不传文件时使用空白简历）
//! - `tailor --session <id>`：恢复已保存的会话

use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use tailor::agents::{AgentMessage, MessageKind};
use tailor::config::load_config;
use tailor::core::{AgentError, Orchestrator, OrchestratorBuilder, SessionState, StepResult, WorkflowStage};
use tailor::document::Resume;
use tailor::llm::{create_llm_from_config, LlmClient};
use tailor::observability;
use tailor::storage::{create_session_store, SessionManager};

const HELP: &str = "\
命令：
  /open            让顾问就当前任务开场
  /confirm         执行待确认的修改
  /skip            跳过当前任务
  /next            不改状态地前往下一个任务
  /switch <板块>   切换到指定板块
  /progress        查看进度
  /sessions        列出已保存的会话
  /rename <名称>   重命名当前会话
  /quit            保存并退出
其余输入作为对话发送给顾问。";

fn print_event(msg: &AgentMessage) {
    match msg.kind {
        MessageKind::Think => println!("  [思考] {}", msg.content),
        MessageKind::Answer => println!("\n{}\n", msg.content),
        MessageKind::Draft => println!("------ 草稿 ------\n{}\n------------------", msg.content),
        MessageKind::Error => eprintln!("  [错误] {}", msg.content),
        _ => println!("  · {}", msg.content),
    }
}

/// 边执行边打印事件；fut 结束时发送端随之释放，打印循环退出
async fn drive<F>(fut: F, mut rx: mpsc::UnboundedReceiver<AgentMessage>) -> F::Output
where
    F: Future,
{
    let printer = async {
        while let Some(msg) = rx.recv().await {
            print_event(&msg);
        }
    };
    tokio::join!(fut, printer).0
}

fn report(result: Result<StepResult, AgentError>, session: &SessionState) {
    match result {
        Ok(_) if session.stage == WorkflowStage::Confirming => {
            println!("输入 /confirm 执行修改，或继续对话调整草稿。");
        }
        Ok(_) if session.stage == WorkflowStage::Completed => {
            println!("所有任务已处理完毕。可以 /switch 回到某个板块继续修改。");
        }
        Ok(_) => {}
        Err(e) if e.is_precondition() => println!("无法执行：{}", e),
        Err(e) => eprintln!("执行失败：{}（可重试）", e),
    }
}

fn print_progress(orchestrator: &Orchestrator, session: &SessionState) {
    let p = orchestrator.progress(session);
    println!(
        "进度：完成 {}/{}，跳过 {}，阶段 {:?}",
        p.completed, p.total, p.skipped, session.stage
    );
    for (i, t) in p.tasks.iter().enumerate() {
        let marker = if i == p.current_index { "▶" } else { " " };
        println!("{} {}. [{:?}] {}", marker, t.id, t.status, t.section);
    }
}

fn print_token_usage(llm: &dyn LlmClient) {
    let (prompt, completion, total) = llm.token_usage();
    println!("Token：输入 {}，输出 {}，合计 {}", prompt, completion, total);
}

async fn open_current(orchestrator: &Orchestrator, session: &mut SessionState) {
    if session.current_task().is_none() {
        return;
    }
    match orchestrator.open_task(session).await {
        Ok(r) => r.events.iter().for_each(print_event),
        Err(e) => eprintln!("开场失败：{}", e),
    }
}

async fn load_session(manager: &SessionManager, args: &[String]) -> anyhow::Result<SessionState> {
    match args {
        [flag, id, ..] if flag == "--session" => manager
            .get(id)
            .await
            .with_context(|| format!("Failed to restore session {}", id)),
        [path, ..] => {
            let data = tokio::fs::read_to_string(PathBuf::from(path))
                .await
                .with_context(|| format!("Failed to read resume {}", path))?;
            let document: Resume = serde_json::from_str(&data).context("Invalid resume JSON")?;
            Ok(manager.create(document).await?)
        }
        [] => Ok(manager.create(Resume::default()).await?),
    }
}

async fn read_line<R>(lines: &mut tokio::io::Lines<R>, prompt: &str) -> anyhow::Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let llm = create_llm_from_config(&cfg);
    let orchestrator = OrchestratorBuilder::new(llm.clone()).build();
    let manager = SessionManager::new(create_session_store(&cfg));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut session = load_session(&manager, &args).await?;
    let app_name = cfg.app.name.as_deref().unwrap_or("tailor");
    println!("{} · 会话 {}\n{}\n", app_name, session.session_id, HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if session.plan.is_none() {
        let Some(intent) = read_line(&mut lines, "求职意向 > ").await? else {
            return Ok(());
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let result = drive(
            async {
                let tx = tx;
                orchestrator.produce_plan_stream(&mut session, &intent, &tx).await
            },
            rx,
        )
        .await;
        report(result, &session);
        manager.save(&session).await.context("Failed to save session")?;
        print_progress(&orchestrator, &session);
        open_current(&orchestrator, &mut session).await;
    }

    while let Some(line) = read_line(&mut lines, "> ").await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let (cmd, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line.as_str(), ""),
        };

        match cmd {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/progress" => {
                print_progress(&orchestrator, &session);
                print_token_usage(llm.as_ref());
            }
            "/open" => open_current(&orchestrator, &mut session).await,
            "/confirm" => {
                let (tx, rx) = mpsc::unbounded_channel();
                let result = drive(
                    async {
                        let tx = tx;
                        orchestrator.apply_change_stream(&mut session, &tx).await
                    },
                    rx,
                )
                .await;
                let applied = result.is_ok();
                report(result, &session);
                if applied {
                    open_current(&orchestrator, &mut session).await;
                }
            }
            "/skip" => match orchestrator.skip_current_task(&mut session) {
                Ok(task) => {
                    println!("已跳过：{}", task.section);
                    open_current(&orchestrator, &mut session).await;
                }
                Err(e) => println!("无法执行：{}", e),
            },
            "/next" => match orchestrator.advance_task(&mut session) {
                Ok(()) => open_current(&orchestrator, &mut session).await,
                Err(e) => println!("无法执行：{}", e),
            },
            "/switch" => match orchestrator.switch_to_task(&mut session, arg) {
                Ok(idx) => {
                    println!("已切换到任务 {}", idx + 1);
                    open_current(&orchestrator, &mut session).await;
                }
                Err(e) => println!("无法执行：{}", e),
            },
            "/sessions" => {
                for m in manager.list().await? {
                    println!(
                        "{}  {}  {}/{}  {:?}  {}",
                        m.id,
                        m.name.as_deref().unwrap_or("-"),
                        m.progress.completed,
                        m.progress.total,
                        m.status,
                        m.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            "/rename" => {
                manager.save(&session).await?;
                let meta = manager.rename(&session.session_id, arg).await?;
                println!("已重命名为：{}", meta.name.unwrap_or_default());
            }
            _ if cmd.starts_with('/') => println!("未知命令：{}\n{}", cmd, HELP),
            _ => {
                let (tx, rx) = mpsc::unbounded_channel();
                let result = drive(
                    async {
                        let tx = tx;
                        orchestrator
                            .advance_conversation_stream(&mut session, &line, &tx)
                            .await
                    },
                    rx,
                )
                .await;
                report(result, &session);
            }
        }
        manager.save(&session).await.context("Failed to save session")?;
    }

    manager.save(&session).await.context("Failed to save session")?;
    println!("会话已保存：{}", session.session_id);
    print_token_usage(llm.as_ref());
    let (_, _, total) = llm.token_usage();
    tracing::info!(session = %session.session_id, total_tokens = total, "Session closed");
    Ok(())
}
