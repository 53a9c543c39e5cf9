//! Terminal Pomodoro timer.
//!
//! Logs in to a running service (or opens a local workspace with
//! `--workspace`), loads a task and the user's durations, then counts down
//! once per second. Commands are read line by line from stdin; progress is
//! only ever what the store reports back.

use anyhow::Context;
use clap::Parser;
use pomodoro_web::application::commands::{get_settings_impl, get_task_impl, login_impl, AppState};
use pomodoro_web::application::timer_driver::{DriverError, TimerCommand, TimerDriver, TimerEvent};
use pomodoro_web::domain::models::{SessionContext, Settings, Task};
use pomodoro_web::domain::timer::{TimerPhase, TimerSession};
use pomodoro_web::infrastructure::api_client::HttpProgressAuthority;
use pomodoro_web::infrastructure::progress_authority::ProgressAuthority;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

const HELP: &str = "commands: start | pause | reset | skip (then yes/no) | next | retry | quit";

#[derive(Debug, Parser)]
#[command(name = "pomodoro-timer", about = "Run a Pomodoro timer against a task")]
struct Cli {
    /// Base URL of the Pomodoro service.
    #[arg(long, env = "POMODORO_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "POMODORO_PASSWORD", hide_env_values = true)]
    password: String,
    /// Id of the task to work on.
    #[arg(long)]
    task: i64,
    /// Seconds to wait for each server response before offering a retry.
    #[arg(long, env = "POMODORO_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,
    /// Work directly against a workspace's database instead of a server.
    #[arg(long, env = "POMODORO_WORKSPACE")]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.workspace.clone() {
        Some(workspace) => {
            let state = AppState::new(workspace.clone())
                .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
            let login = login_impl(&state, &cli.email, &cli.password).context("login failed")?;
            let session = SessionContext {
                user_id: login.user.id,
                username: login.user.username,
            };
            let task = get_task_impl(&state, &session, cli.task)
                .with_context(|| format!("failed to load task {}", cli.task))?
                .task;
            let settings = get_settings_impl(&state, &session).context("failed to load settings")?;
            let authority = state.progress_authority(&session);
            run(&session.username, task, settings, authority).await
        }
        None => {
            let timeout = Duration::from_secs(cli.timeout_secs.max(1));
            let authority = HttpProgressAuthority::with_timeout(&cli.server, timeout)?;
            let user = authority
                .login(&cli.email, &cli.password)
                .await
                .context("login failed")?;
            let task = authority
                .fetch_task(cli.task)
                .await
                .with_context(|| format!("failed to load task {}", cli.task))?;
            let settings = authority.fetch_settings().await.context("failed to load settings")?;
            run(&user.username, task, settings, authority).await
        }
    }
}

async fn run<A: ProgressAuthority>(
    username: &str,
    task: Task,
    settings: Settings,
    authority: A,
) -> anyhow::Result<()> {
    println!(
        "{}: {} ({}/{} pomodoros, {} min work / {} min break)",
        username,
        task.title,
        task.completed_pomodoros,
        task.pomodoros_needed,
        settings.work_duration,
        settings.break_duration
    );
    println!("{HELP}");

    let mut driver = TimerDriver::new(TimerSession::new(&task, settings), authority);
    if driver.session().pending_effect().is_some() {
        let result = driver.apply(TimerCommand::Retry).await;
        report(&driver, result);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while driver.session().phase() != TimerPhase::TaskComplete {
        tokio::select! {
            _ = ticker.tick() => {
                if driver.session().is_running() {
                    let result = driver.tick().await;
                    report(&driver, result);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let input = line.trim();
                match input {
                    "" => {}
                    "quit" | "q" | "exit" => break,
                    "help" | "h" | "?" => println!("{HELP}"),
                    _ => match TimerCommand::parse(input) {
                        Some(command) => {
                            let result = driver.apply(command).await;
                            report(&driver, result);
                            if command == TimerCommand::RequestSkip && driver.session().snapshot().skip_requested {
                                println!("Skip the current phase? (yes/no)");
                            }
                        }
                        None => println!("unknown command '{input}'; {HELP}"),
                    },
                }
            }
        }
    }

    if driver.session().phase() == TimerPhase::TaskComplete {
        println!("\nTask complete!");
    }
    Ok(())
}

fn report<A: ProgressAuthority>(driver: &TimerDriver<A>, result: Result<Vec<TimerEvent>, DriverError>) {
    match result {
        Ok(events) if events.is_empty() => print_status(driver),
        Ok(events) => {
            for event in events {
                match event {
                    TimerEvent::IntervalRecorded(progress) => println!(
                        "\nPomodoro recorded: {}/{} ({:.0}%)",
                        progress.completed_pomodoros,
                        progress.pomodoros_needed,
                        progress.progress_percent()
                    ),
                    TimerEvent::PhaseChanged(TimerPhase::Break) => {
                        println!("Break time! Type 'start' to begin your break.")
                    }
                    TimerEvent::PhaseChanged(TimerPhase::BreakComplete) => {
                        println!("\nBreak complete! Type 'next' for the next pomodoro.")
                    }
                    TimerEvent::PhaseChanged(phase) => println!("\n{}", phase.label()),
                    TimerEvent::TaskCompleted { already_completed } => {
                        if already_completed {
                            println!("Task was already marked complete.");
                        }
                    }
                }
            }
            print_status(driver);
        }
        Err(DriverError::Authority(error)) => {
            println!("\nCould not save progress: {error}. Type 'retry' to try again.");
        }
        Err(error) => println!("\n{error}"),
    }
}

fn print_status<A: ProgressAuthority>(driver: &TimerDriver<A>) {
    let snapshot = driver.snapshot();
    if snapshot.phase == TimerPhase::TaskComplete {
        return;
    }
    let state = if snapshot.paused { " (paused)" } else { "" };
    print!(
        "\r{} {}{}  [{}/{}]   ",
        snapshot.phase.label(),
        snapshot.clock(),
        state,
        snapshot.completed_pomodoros,
        snapshot.pomodoros_needed
    );
    let _ = std::io::stdout().flush();
}
