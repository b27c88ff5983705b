//! Codewright 命令行入口
//!
//! 用法：`codewright <instruction...> [--file PATH]... [--incremental] [--config PATH]`
//! 初始化日志、加载配置、创建 Agent，处理一次请求并打印结果；Ctrl+C 取消当前运行。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use codewright::config::load_config;
use codewright::core::{CodingOutcome, CodingRequest, ConsoleInteraction, Strategy};
use codewright::pipeline::PipelineEvent;
use codewright::{create_agent, AgentError};

const USAGE: &str = "usage: codewright <instruction...> [--file PATH]... [--incremental] [--config PATH]";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    instruction: String,
    files: Vec<PathBuf>,
    incremental: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut words = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--file" | "-f" => {
                let path = iter.next().context("--file needs a path")?;
                parsed.files.push(PathBuf::from(path));
            }
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--incremental" => parsed.incremental = true,
            "--help" | "-h" => bail!(USAGE),
            _ => words.push(arg),
        }
    }
    parsed.instruction = words.join(" ");
    if parsed.instruction.trim().is_empty() {
        bail!(USAGE);
    }
    Ok(parsed)
}

fn print_event(ev: &PipelineEvent) {
    match ev {
        PipelineEvent::PhaseChanged { phase } => eprintln!("[{}]", phase.label()),
        PipelineEvent::ActionReceived { action, summary } => eprintln!("  {} {}", action, summary),
        PipelineEvent::ActionFeedback { feedback, success: false } => eprintln!("  ! {}", feedback),
        PipelineEvent::MultiActionRejected { count } => {
            eprintln!("  ! reply had {} actions, asking for one", count)
        }
        PipelineEvent::Evaluation {
            iteration,
            meets_requirements,
            confidence,
        } => eprintln!(
            "  iteration {}: meets requirements = {}, confidence = {:.2}",
            iteration, meets_requirements, confidence
        ),
        PipelineEvent::Error { text } => eprintln!("  error: {}", text),
        _ => {}
    }
}

fn print_outcome(outcome: &CodingOutcome) {
    println!("\nStatus: {:?} (confidence {:.2}, {} iteration(s))", outcome.status, outcome.confidence, outcome.iterations);
    println!("{}", outcome.result.explanation);
    if !outcome.result.file_changes.is_empty() {
        println!("\nFiles:");
        for change in &outcome.result.file_changes {
            println!("  {}", change.path());
        }
    }
    if !outcome.next_steps.is_empty() {
        println!("\nNext steps:");
        for step in &outcome.next_steps {
            println!("  - {}", step);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codewright::observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    let mut cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    if args.incremental {
        cfg.agent.strategy = Strategy::Incremental;
    }

    let interaction = Arc::new(ConsoleInteraction::new());
    let mut agent = create_agent(&cfg, interaction).context("Failed to create agent")?;

    let supervisor = agent.supervisor();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            supervisor.cancel();
        }
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    let request = CodingRequest::new(args.instruction).with_files(args.files);
    let outcome = agent.process(&request, Some(&event_tx)).await;
    drop(event_tx);
    let _ = printer.await;

    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            let (prompt, completion, total) = agent.token_usage();
            tracing::info!(prompt, completion, total, "token usage");
            Ok(())
        }
        Err(AgentError::Cancelled) => {
            eprintln!("Cancelled. Files written before cancellation are kept.");
            Ok(())
        }
        Err(e) => Err(e).context("Request failed"),
    }
}
