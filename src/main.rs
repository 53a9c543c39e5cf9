use anyhow::Context;
use clap::Parser;
use pomodoro_web::application::commands::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pomodoro-web", about = "Pomodoro task tracker service")]
struct Cli {
    /// Workspace root holding config/, state/ and logs/.
    #[arg(long, env = "POMODORO_WORKSPACE")]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };

    let state = AppState::new(workspace_root.clone())
        .with_context(|| format!("failed to initialize workspace {}", workspace_root.display()))?;

    let file_appender = tracing_appender::rolling::daily(state.logs_dir(), "pomodoro.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let bind_address = state.config().bind_address.clone();
    tracing::info!(
        workspace = %state.workspace_root().display(),
        database = %state.database_path().display(),
        timezone = %state.config().timezone,
        "pomodoro service starting"
    );

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    pomodoro_web::serve(listener, Arc::new(state), async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
    .context("server exited with error")?;

    tracing::info!("pomodoro service shut down cleanly");
    Ok(())
}
