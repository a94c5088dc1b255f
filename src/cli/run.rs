//! `ailex run`: wire every component together and run until a signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use ailex::agent::Dispatcher;
use ailex::bus::MessageBus;
use ailex::channels::{Channel, TelegramChannel};
use ailex::config::Config;
use ailex::delegation::{DelegationMachine, DelegationRegistry, HttpToolService};
use ailex::feed::RssFeedFetcher;
use ailex::health::{self, HealthCheck, HealthRegistry};
use ailex::heartbeat::HeartbeatService;
use ailex::providers::{LLMProvider, OpenAIProvider};
use ailex::quality::QualityGate;
use ailex::scheduler::ContentScheduler;
use ailex::session::{SessionEvictor, SessionStore};
use ailex::supervisor::{shutdown_signal, Supervisor, TaskOutcome};

/// Time each background task gets to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Start the bot and block until Ctrl+C or SIGTERM.
pub(crate) async fn cmd_run(config: Config) -> Result<()> {
    let diagnostics = config.validate();
    for diag in diagnostics.iter().filter(|d| !d.is_error()) {
        info!("{}", diag);
    }
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect();
    if !errors.is_empty() {
        for e in &errors {
            error!("{}", e);
        }
        bail!("Configuration has {} error(s); run `ailex config check`", errors.len());
    }

    info!("Starting AIlex v{}", env!("CARGO_PKG_VERSION"));

    let health_registry = HealthRegistry::new();
    let bus = Arc::new(MessageBus::new());
    let sessions = Arc::new(SessionStore::from_config(&config.sessions));

    let provider: Arc<dyn LLMProvider> = Arc::new(
        OpenAIProvider::from_config(&config.provider)
            .with_context(|| "Failed to create text generation client")?,
    );
    info!(
        provider = provider.name(),
        model = provider.default_model(),
        "Text generation client ready"
    );

    let channel: Arc<dyn Channel> = Arc::new(
        TelegramChannel::new(config.telegram.clone(), Arc::clone(&bus))
            .with_context(|| "Failed to create Telegram channel")?,
    );

    let mut dispatcher = Dispatcher::from_config(
        &config,
        Arc::clone(&sessions),
        Arc::clone(&provider),
        Arc::clone(&channel),
    );
    if config.delegation.enabled {
        let service = HttpToolService::from_config(&config.delegation)
            .with_context(|| "Failed to create tool service client")?;
        let machine = DelegationMachine::from_config(
            &config.delegation,
            Arc::new(DelegationRegistry::new()),
            Arc::new(service),
        );
        dispatcher = dispatcher.with_delegation(Arc::new(machine));
        info!(base_url = %config.delegation.base_url, "Delegation enabled");
    }
    let dispatcher = Arc::new(dispatcher);

    let mut supervisor = Supervisor::new();

    if config.health.enabled {
        let listener = health::bind(&config.health)
            .await
            .with_context(|| "Failed to bind liveness server")?;
        let registry = health_registry.clone();
        let rx = supervisor.subscribe();
        supervisor.spawn("health", health::serve(listener, registry, rx));
    }

    channel
        .start()
        .await
        .with_context(|| "Failed to start Telegram channel")?;
    if channel.is_running() {
        health_registry.register(HealthCheck::ok("telegram"));
    } else {
        warn!("Telegram channel is not running; no messages will be received");
    }

    supervisor.spawn(
        "dispatcher",
        Arc::clone(&dispatcher).run(Arc::clone(&bus), supervisor.subscribe()),
    );

    let evictor = SessionEvictor::new(Arc::clone(&sessions), config.sessions.sweep_interval_secs);
    supervisor.spawn("evictor", evictor.run(supervisor.subscribe()));

    if config.scheduler.enabled {
        let gate = QualityGate::from_config(&config.quality)
            .with_context(|| "Failed to build quality gate")?;
        let feed = RssFeedFetcher::from_config(&config.feed)
            .with_context(|| "Failed to create feed fetcher")?;
        let scheduler = ContentScheduler::from_config(
            &config,
            gate,
            Arc::new(feed),
            Arc::clone(&provider),
            Arc::clone(&channel),
        )
        .with_health(health_registry.clone());
        supervisor.spawn("scheduler", scheduler.run(supervisor.subscribe()));
    } else {
        info!("Content scheduler disabled");
    }

    if config.heartbeat.enabled && !config.heartbeat.url.is_empty() {
        let heartbeat = HeartbeatService::from_config(&config.heartbeat)
            .with_context(|| "Failed to create heartbeat")?
            .with_health(health_registry.clone());
        supervisor.spawn("heartbeat", heartbeat.run(supervisor.subscribe()));
    }

    info!(tasks = supervisor.task_count(), "AIlex is running");
    let reports = supervisor.run_until(shutdown_signal(), SHUTDOWN_GRACE).await;

    if let Err(e) = channel.stop().await {
        warn!("Failed to stop Telegram channel cleanly: {}", e);
    }

    let panicked: Vec<&str> = reports
        .iter()
        .filter(|r| r.outcome == TaskOutcome::Panicked)
        .map(|r| r.name.as_str())
        .collect();
    if !panicked.is_empty() {
        warn!("Tasks that panicked during the run: {}", panicked.join(", "));
    }

    info!("AIlex stopped");
    Ok(())
}
