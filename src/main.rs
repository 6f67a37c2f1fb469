use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use hookvault::{
    AppState, build_app,
    config::HookvaultConfig,
    dispatch::{
        Dispatcher, QueueDispatcher, create_task_queue,
        worker::{HttpInvoker, TaskInvoker, start_dispatch_worker},
    },
    observability,
    purge::start_retention_scheduler,
    store::create_store,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How long shutdown waits for background tasks to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// CLI arguments for hookvault
#[derive(Parser, Debug)]
#[command(version, about = "Webhook archive service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "hookvault.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the server (default)
    Serve,
    /// Load and validate the config file, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => {
            let config = load_config(&args.config);
            println!(
                "{} is valid (storage: {}, queue: {})",
                args.config.display(),
                config.storage.kind(),
                config.dispatcher.queue.kind()
            );
        }
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn load_config(path: &PathBuf) -> HookvaultConfig {
    match HookvaultConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn exit_on_error<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "{what}");
            eprintln!("Error: {what}: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_server(config_path: &PathBuf) {
    let config = load_config(config_path);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    tracing::info!(config_file = %config_path.display(), "Starting hookvault");

    if config.app.admin_token.is_none() {
        tracing::info!("No admin token configured; POST /purge is disabled");
    }

    let store = exit_on_error(
        create_store(&config.storage).await,
        "Failed to open archive store",
    );
    let queue = exit_on_error(
        create_task_queue(&config.dispatcher.queue).await,
        "Failed to open task queue",
    );
    let http_client = exit_on_error(
        config.server.http_client.build_client(),
        "Failed to build HTTP client",
    );

    let queue_dispatcher = QueueDispatcher::new(queue.clone());
    let wake = queue_dispatcher.wake_handle();
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(queue_dispatcher);

    let state = AppState::new(
        config.clone(),
        store,
        queue.clone(),
        dispatcher.clone(),
        http_client.clone(),
    );

    let cancel = CancellationToken::new();
    let task_tracker = TaskTracker::new();

    let invoker: Arc<dyn TaskInvoker> = Arc::new(HttpInvoker::new(
        http_client,
        config.dispatcher.invoke_base_url(&config.server),
        config.dispatcher.invoke_timeout(),
        config.app.key.as_bytes(),
    ));
    task_tracker.spawn(start_dispatch_worker(
        queue,
        invoker,
        config.dispatcher.clone(),
        wake,
        cancel.clone(),
    ));
    task_tracker.spawn(start_retention_scheduler(
        dispatcher,
        config.retention.clone(),
        cancel.clone(),
    ));

    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = exit_on_error(
        tokio::net::TcpListener::bind(&bind_addr).await,
        "Failed to bind to address",
    );

    tracing::info!("Server listening on http://{}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker, cancel))
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal(task_tracker: TaskTracker, cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping background tasks...");

    cancel.cancel();
    task_tracker.close();

    match tokio::time::timeout(SHUTDOWN_GRACE, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}
