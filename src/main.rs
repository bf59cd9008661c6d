use anyhow::{Context, Result};
use clap::Parser;
use feedhook::config::{Config, FeedInstanceConfig, ValidatedConfig};
use feedhook::feed::{HttpFeedSource, PostFilter};
use feedhook::http::{build_client, HttpSettings, ResilientClient};
use feedhook::notify::{PayloadBuilder, WebhookNotifier};
use feedhook::state::FeedStateEngine;
use feedhook::storage::StateStore;
use feedhook::worker::FeedWorker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_PATH: &str = "config/feedhook.toml";

#[derive(Parser, Debug)]
#[command(name = "feedhook", about = "Relay RSS and YouTube feeds to Discord webhooks")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(value_name = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Everything shared between feed instances.
struct Shared {
    http: reqwest::Client,
    throttle: Arc<Semaphore>,
    settings: Arc<HttpSettings>,
    persistence_path: PathBuf,
}

fn build_worker(shared: &Shared, instance: FeedInstanceConfig) -> FeedWorker {
    let client = Arc::new(ResilientClient::new(
        shared.http.clone(),
        Arc::clone(&shared.throttle),
        Arc::clone(&shared.settings),
    ));

    let source = Arc::new(HttpFeedSource::new(Arc::clone(&client), instance.description_limit));
    let engine = FeedStateEngine::new(
        source,
        PostFilter::new(&instance.post_filters),
        instance.feeds,
        instance.concurrent_requests,
    );

    let payloads = PayloadBuilder::new(instance.display, instance.markdown);
    let notifier = Arc::new(WebhookNotifier::new(client, instance.webhook, instance.forum, payloads));

    let store = instance
        .persist_on_shutdown
        .then(|| StateStore::new(&shared.persistence_path));

    FeedWorker::new(instance.id, engine, notifier, store, instance.interval)
}

/// Resolves when the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn load_config(path: &Path) -> Result<ValidatedConfig> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from '{}'", path.display()))?;
    config.validate().context("Invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedhook=info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    let settings = HttpSettings::new(
        config.default_user_agent.clone(),
        &config.fallback_user_agents,
        config.post_min_interval,
    )
    .context("Failed to compile robots.txt pattern")?;
    let shared = Shared {
        http: build_client(config.http_timeout, &config.default_user_agent)
            .context("Failed to build HTTP client")?,
        throttle: Arc::new(Semaphore::new(config.concurrent_requests)),
        settings: Arc::new(settings),
        persistence_path: config.persistence_path.clone(),
    };

    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();
    for instance in config.instances {
        let mut worker = build_worker(&shared, instance);
        let cancel = cancel.clone();
        workers.spawn(async move { worker.run(&cancel).await });
    }
    tracing::info!(instances = workers.len(), "feedhook running");

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested");
            cancel.cancel();
        });
    }

    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        let outcome = joined
            .map_err(anyhow::Error::from)
            .and_then(|result| result.map_err(anyhow::Error::from));
        if let Err(e) = outcome {
            tracing::error!(critical = true, error = %e, "Feed instance failed, stopping all instances");
            cancel.cancel();
            failure.get_or_insert(e);
        }
    }

    match failure {
        Some(e) => Err(e.context("feedhook stopped after an instance failure")),
        None => {
            tracing::info!("All feed instances stopped");
            Ok(())
        }
    }
}
