use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use agent_tasks::agents::{AgentDirectory, ShellAgent};
use agent_tasks::config::{RegistryConfig, ServerConfig};
use agent_tasks::context::CallContext;
use agent_tasks::tasks::routes::task_routes;
use agent_tasks::tasks::{Dispatcher, QueryService, TaskStore};
use agent_tasks::tools::ToolRegistry;
use agent_tasks::tools::builtin::{DelegateTool, TaskManagerTool};

/// One line of stdin: `{"tool": "<name>", "params": {...}}`.
#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
}

fn load_config() -> agent_tasks::error::Result<(ServerConfig, RegistryConfig)> {
    Ok((ServerConfig::from_env()?, RegistryConfig::from_env()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (server_config, registry_config) = load_config()?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match &server_config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "agent-tasks.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    };

    eprintln!("🗂  Agent Tasks v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Node: {}", registry_config.node_id);
    eprintln!("   Task API: http://0.0.0.0:{}/api/tasks", server_config.port);
    eprintln!("   Send {{\"tool\": ..., \"params\": ...}} lines on stdin. EOF to exit.\n");

    // ── Task registry ─────────────────────────────────────────────────────
    let store = Arc::new(TaskStore::new(&registry_config));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));
    let service = Arc::new(QueryService::new(
        Arc::clone(&store),
        registry_config.summary_chars,
    ));

    // ── Child agents ──────────────────────────────────────────────────────
    let agents = Arc::new(AgentDirectory::new());
    let mut shell = ShellAgent::new();
    if let Some(dir) = &server_config.shell_workdir {
        shell = shell.with_working_dir(dir.clone());
    }
    agents.register(Arc::new(shell)).await;

    // ── Tools ─────────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    tools.register_sync(Arc::new(TaskManagerTool::new(Arc::clone(&service))));
    tools.register_sync(Arc::new(DelegateTool::new(
        Arc::clone(&dispatcher),
        Arc::clone(&agents),
    )));
    tracing::info!(tools = tools.count(), agents = agents.len().await, "Tools registered");

    // ── HTTP surface ──────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.port)).await?;
    let app = task_routes(Arc::clone(&service));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Task API server stopped");
        }
    });
    tracing::info!(port = server_config.port, "Task API server started");

    // ── Stdin loop ────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let ctx = CallContext::new(registry_config.node_id.clone());
        let output = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => match tools.execute(&call.tool, call.params, &ctx).await {
                Ok(output) => output.result,
                Err(e) => serde_json::json!({"success": false, "error": e.to_string()}),
            },
            Err(e) => serde_json::json!({
                "success": false,
                "error": format!("Malformed request: {e}"),
            }),
        };
        println!("{output}");
    }

    dispatcher.shutdown_and_join().await;
    Ok(())
}
