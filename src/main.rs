//! Mastery 命令行入口
//!
//! 初始化日志、加载配置与课程、生成候选路径，然后进入「讲授 -> 回答」交互循环。
//! 输入 quit / exit / q 或按 Ctrl+C 结束会话。

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mastery::config::load_config;
use mastery::core::SessionEvent;
use mastery::lesson::{discover_lesson_files, list_lessons, load_lesson};
use mastery::llm::create_llm_from_config;
use mastery::{Orchestrator, SessionError, SessionHandle, TurnOutput};

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// 命令行参数
#[derive(Parser)]
#[command(name = "mastery", version, about = "Adaptive multi-agent tutor")]
struct Cli {
    /// 课程计划 JSON；缺省时在当前目录查找 LessonPlan*.json
    lesson_file: Option<PathBuf>,
    /// 课程编号（从 1 开始）；缺省时交互选择
    #[arg(long)]
    lesson_number: Option<u32>,
    /// 只列出课程并退出
    #[arg(long)]
    list_lessons: bool,
    /// 候选路径编号（从 1 开始）；缺省时交互选择
    #[arg(long)]
    path: Option<usize>,
    /// 配置文件路径（默认 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 日志级别（RUST_LOG 优先）
    #[arg(long, default_value = "info")]
    log_level: String,
    /// 日志文件
    #[arg(long, default_value = "mastery.log")]
    log_file: PathBuf,
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_file);
    let mut preset = preset_path(cli.path)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let lesson_file = match cli.lesson_file.clone() {
        Some(path) => path,
        None => {
            let found = discover_lesson_files(Path::new("."));
            if found.is_empty() {
                bail!("No LessonPlan*.json found in the current directory; pass a lesson file");
            }
            if cli.list_lessons {
                for file in &found {
                    print_lessons(file)?;
                }
                return Ok(());
            }
            match choose_lesson_file(&found, &mut input, &shutdown).await? {
                Some(path) => path,
                None => return Ok(()),
            }
        }
    };
    if cli.list_lessons {
        print_lessons(&lesson_file)?;
        return Ok(());
    }

    let lesson_number = match cli.lesson_number {
        Some(n) => n,
        None => match choose_lesson_number(&lesson_file, &mut input, &shutdown).await? {
            Some(n) => n,
            None => return Ok(()),
        },
    };
    let lesson = load_lesson(&lesson_file, lesson_number).context("Failed to load lesson")?;

    let cfg = match cli.config.clone() {
        Some(path) => load_config(Some(path.clone()))
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_config(None).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            Default::default()
        }),
    };
    let llm = create_llm_from_config(&cfg);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(report_events(event_rx));
    let orchestrator = Arc::new(Orchestrator::new(llm.clone(), &cfg).with_event_tx(event_tx));

    println!("\nPreparing learning paths for \"{}\"...", lesson.title);
    let state = tokio::select! {
        r = orchestrator.start(lesson) => r.context("Failed to start session")?,
        _ = shutdown.cancelled() => return Ok(()),
    };
    render(&TurnOutput::candidates(&state));

    let count = state.candidates().len();
    let handle = SessionHandle::new(orchestrator, state);

    // 输入已被接受但下一轮起草失败时为 true，下一次输入触发 resume
    let mut drafting = false;
    let mut output = loop {
        let choice = match preset.take() {
            Some(choice) => choice,
            None => {
                let prompt = format!("Choose a path (1-{count}, Enter for 1): ");
                let Some(line) = read_line(&mut input, &shutdown, &prompt).await? else {
                    handle.abandon();
                    return Ok(());
                };
                if QUIT_WORDS.contains(&line.to_lowercase().as_str()) {
                    handle.abandon();
                    return Ok(());
                }
                if line.is_empty() {
                    None
                } else {
                    match line.parse::<usize>() {
                        Ok(n) if n >= 1 => Some(n - 1),
                        _ => {
                            println!("Please enter a number.");
                            continue;
                        }
                    }
                }
            }
        };
        match handle.select_path(choice).await {
            Ok(out) => break Some(out),
            Err(e @ SessionError::InvalidPathSelection { .. }) => println!("{e}"),
            Err(e) if e.needs_resume() => break recover(&handle, &e, &mut drafting).await,
            Err(e) => return Err(e).context("Failed to start teaching"),
        }
    };

    if let Some(out) = &output {
        render(out);
    }
    while !output.as_ref().is_some_and(TurnOutput::is_complete) {
        let Some(line) = read_line(&mut input, &shutdown, "> ").await? else {
            handle.abandon();
            println!("\nSession ended.");
            break;
        };
        if line.is_empty() && !drafting {
            continue;
        }
        if QUIT_WORDS.contains(&line.to_lowercase().as_str()) {
            handle.abandon();
            println!("Session ended.");
            break;
        }

        let step = async {
            if drafting {
                handle.resume().await
            } else {
                handle.respond(&line).await
            }
        };
        let result = tokio::select! {
            r = step => Some(r),
            _ = shutdown.cancelled() => None,
        };
        let Some(result) = result else {
            handle.abandon();
            println!("\nSession ended.");
            break;
        };
        let next = match result {
            Ok(out) => {
                drafting = false;
                Some(out)
            }
            Err(e) if e.needs_resume() || (drafting && e.is_retryable()) => {
                recover(&handle, &e, &mut drafting).await
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Turn failed: {}", e);
                println!("Something went wrong ({e}). Please send your answer again.");
                None
            }
            Err(e) => {
                println!("{e}");
                None
            }
        };
        if let Some(out) = next {
            render(&out);
            output = Some(out);
        }
    }

    let state = handle.snapshot().await;
    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    tracing::info!(
        session = %state.id(),
        turns = state.turns().len(),
        complete = state.is_complete(),
        prompt_tokens,
        completion_tokens,
        total_tokens,
        "Session finished"
    );
    if total_tokens > 0 {
        println!("(tokens used: {total_tokens} = {prompt_tokens} prompt + {completion_tokens} completion)");
    }
    Ok(())
}

/// 日志写入文件（无 ANSI）；文件不可用时写 stderr
fn init_tracing(level: &str, log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let (file_layer, stderr_layer) = match file {
        Ok(f) => (
            Some(fmt::layer().with_writer(Mutex::new(f)).with_ansi(false)),
            None,
        ),
        Err(_) => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

async fn choose_lesson_file(
    found: &[PathBuf],
    input: &mut InputLines,
    shutdown: &CancellationToken,
) -> anyhow::Result<Option<PathBuf>> {
    if let [only] = found {
        return Ok(Some(only.clone()));
    }
    println!("\nLesson plans found:");
    for (i, file) in found.iter().enumerate() {
        println!("  {}. {}", i + 1, file.display());
    }
    loop {
        let Some(n) = prompt_number(input, shutdown, "Select a lesson plan").await? else {
            return Ok(None);
        };
        match found.get(n - 1) {
            Some(path) => return Ok(Some(path.clone())),
            None => println!("Please choose 1-{}.", found.len()),
        }
    }
}

/// 只有一节课时直接选中
async fn choose_lesson_number(
    path: &Path,
    input: &mut InputLines,
    shutdown: &CancellationToken,
) -> anyhow::Result<Option<u32>> {
    let lessons = list_lessons(path).context("Failed to list lessons")?;
    if let [only] = lessons.as_slice() {
        return Ok(Some(only.number));
    }
    print_lessons(path)?;
    loop {
        let Some(n) = prompt_number(input, shutdown, "Select a lesson number").await? else {
            return Ok(None);
        };
        match u32::try_from(n) {
            Ok(n) => return Ok(Some(n)),
            Err(_) => println!("Lesson number {n} is out of range."),
        }
    }
}

fn print_lessons(path: &Path) -> anyhow::Result<()> {
    let lessons = list_lessons(path).context("Failed to list lessons")?;
    println!("\nLessons in {}:", path.display());
    for lesson in lessons {
        if lesson.topics.is_empty() {
            println!("  {}. {}", lesson.number, lesson.title);
        } else {
            println!("  {}. {} ({})", lesson.number, lesson.title, lesson.topics.join(", "));
        }
    }
    Ok(())
}

/// --path 从 1 开始；转换为 0 起始的候选下标
fn preset_path(path: Option<usize>) -> anyhow::Result<Option<Option<usize>>> {
    match path {
        Some(0) => bail!("--path is 1-based, 0 is not a valid path"),
        Some(n) => Ok(Some(Some(n - 1))),
        None => Ok(None),
    }
}

/// 读取一行；EOF 或 Ctrl+C 返回 None
async fn read_line(
    input: &mut InputLines,
    shutdown: &CancellationToken,
    prompt: &str,
) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush().ok();
    tokio::select! {
        line = input.next_line() => Ok(line.context("Failed to read input")?.map(|l| l.trim().to_string())),
        _ = shutdown.cancelled() => Ok(None),
    }
}

async fn prompt_number(
    input: &mut InputLines,
    shutdown: &CancellationToken,
    label: &str,
) -> anyhow::Result<Option<usize>> {
    loop {
        let Some(line) = read_line(input, shutdown, &format!("{label}: ")).await? else {
            return Ok(None);
        };
        if QUIT_WORDS.contains(&line.to_lowercase().as_str()) {
            return Ok(None);
        }
        match line.parse::<usize>() {
            Ok(n) if n >= 1 => return Ok(Some(n)),
            _ => println!("Please enter a number."),
        }
    }
}

/// 下一轮起草失败：立即重试一次，仍失败则等待下一次输入再 resume
async fn recover(handle: &SessionHandle, err: &SessionError, drafting: &mut bool) -> Option<TurnOutput> {
    tracing::warn!("Draft failed: {}", err);
    println!("(The tutor had trouble preparing the next step, trying again...)");
    match handle.resume().await {
        Ok(out) => {
            *drafting = false;
            Some(out)
        }
        Err(e) => {
            *drafting = true;
            println!("Still failing: {e}. Press Enter to try again.");
            None
        }
    }
}

fn render(output: &TurnOutput) {
    println!("\n{}", output.conversation_content);
    if let Some(editor) = &output.editor_content {
        println!(
            "\n```{}\n{}\n```",
            editor.language.as_deref().unwrap_or(""),
            editor.content
        );
    }
    if output.degraded {
        println!("\n(note: this reply skipped the full quality review)");
    }
    println!(
        "\n[module {} | lesson {}: {} | {}]",
        output.lesson_info.module_number,
        output.lesson_info.challenge_number,
        output.lesson_info.topic,
        output.lesson_status.current_phase
    );
}

async fn report_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(ev) = rx.recv().await {
        if let Ok(json) = serde_json::to_string(&ev) {
            tracing::debug!(event = %json, "session event");
        }
        match ev {
            SessionEvent::ReviewRejected { attempt, violations } => {
                println!("(revising draft {attempt}: {})", violations.join(", "));
            }
            SessionEvent::Advanced { node_index } => {
                println!("(moving on to step {})", node_index + 1);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_path_is_one_based() {
        assert!(preset_path(Some(0)).is_err());
        assert_eq!(preset_path(Some(2)).unwrap(), Some(Some(1)));
        assert_eq!(preset_path(None).unwrap(), None);
    }

    #[test]
    fn test_cli_parses_path_and_config() {
        let cli = Cli::try_parse_from(["mastery", "plan.json", "--path", "3", "--config", "my.toml"]).unwrap();
        assert_eq!(cli.path, Some(3));
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert_eq!(cli.log_level, "info");
    }
}
