//! Content scheduler - periodic posts to the broadcast destination
//!
//! Each cycle alternates between the curated topic list and the live feed:
//!
//! 1. pick a topic from the current source (curated rotation, or the feed's
//!    headline at the feed rotation index),
//! 2. flip the source for the next cycle, whatever happens afterwards,
//! 3. generate a post with the post framing and the topic as the only turn,
//! 4. normalize list markup and run the quality gate,
//! 5. publish with the call-to-action button.
//!
//! A cycle that errors or panics is logged and the loop carries on after the
//! full interval. Cycles never overlap: the next sleep starts only after the
//! previous cycle returned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{Affordance, MessageFormat, OutboundMessage};
use crate::channels::Channel;
use crate::config::{Config, SchedulerConfig};
use crate::feed::FeedFetcher;
use crate::health::{HealthCheck, HealthRegistry, HealthStatus};
use crate::log_component;
use crate::providers::{ChatOptions, LLMProvider};
use crate::quality::{QualityGate, Verdict};
use crate::session::Message;
use crate::utils::sanitize::{normalize_markup, sanitize_telegram_html};

/// Name of the scheduler entry in the [`HealthRegistry`].
pub const HEALTH_CHECK_NAME: &str = "scheduler";

/// Rotation state. Only the scheduler loop mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    /// Next curated topic, used modulo the list length.
    pub curated_index: usize,
    /// Next feed headline, used modulo the current feed length.
    pub feed_index: usize,
    /// Whether the next cycle draws from the curated list.
    pub use_curated: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            curated_index: 0,
            feed_index: 0,
            use_curated: true,
        }
    }
}

/// Where a topic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSource {
    Curated,
    Feed,
}

impl std::fmt::Display for TopicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicSource::Curated => write!(f, "curated"),
            TopicSource::Feed => write!(f, "feed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub source: TopicSource,
    pub text: String,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Post went out.
    Published(Topic),
    /// The selected source had nothing to offer.
    NoTopic(TopicSource),
    /// Text generation failed.
    GenerationFailed(String),
    /// The quality gate refused the post.
    Rejected(Verdict),
    /// The post was generated and accepted but could not be delivered.
    SendFailed(String),
    /// The cycle panicked and was contained.
    Panicked,
}

impl CycleOutcome {
    /// Whether the cycle counts towards the degraded threshold.
    ///
    /// Gate rejections are a normal outcome and do not.
    pub fn is_failure(&self) -> bool {
        !matches!(self, CycleOutcome::Published(_) | CycleOutcome::Rejected(_))
    }
}

/// Periodic post generator.
pub struct ContentScheduler {
    state: SchedulerState,
    curated: Vec<String>,
    feed: Arc<dyn FeedFetcher>,
    provider: Arc<dyn LLMProvider>,
    channel: Arc<dyn Channel>,
    gate: QualityGate,
    post_prompt: String,
    destination: String,
    affordance: Option<Affordance>,
    interval: Duration,
    model: Option<String>,
    options: ChatOptions,
    failure_threshold: u32,
    consecutive_failures: u32,
    health: Option<HealthRegistry>,
}

impl ContentScheduler {
    pub fn new(
        curated: Vec<String>,
        feed: Arc<dyn FeedFetcher>,
        provider: Arc<dyn LLMProvider>,
        channel: Arc<dyn Channel>,
        destination: &str,
    ) -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            state: SchedulerState::default(),
            curated,
            feed,
            provider,
            channel,
            gate: QualityGate::default(),
            post_prompt: String::new(),
            destination: destination.to_string(),
            affordance: None,
            interval: Duration::from_secs(defaults.interval_secs),
            model: None,
            options: ChatOptions::default(),
            failure_threshold: defaults.failure_threshold.max(1),
            consecutive_failures: 0,
            health: None,
        }
    }

    /// Build a scheduler from the full configuration.
    pub fn from_config(
        config: &Config,
        gate: QualityGate,
        feed: Arc<dyn FeedFetcher>,
        provider: Arc<dyn LLMProvider>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        let sched = &config.scheduler;
        let mut options = ChatOptions::new();
        if let Some(max_tokens) = config.provider.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = config.provider.temperature {
            options = options.with_temperature(temperature);
        }

        let mut scheduler = Self::new(
            sched.curated_topics.clone(),
            feed,
            provider,
            channel,
            &sched.destination_chat_id,
        )
        .with_gate(gate)
        .with_post_prompt(&config.persona.post_prompt)
        .with_interval(sched.interval_secs)
        .with_options(options);
        scheduler.failure_threshold = sched.failure_threshold.max(1);
        if !sched.cta_label.is_empty() && !sched.cta_url.is_empty() {
            scheduler.affordance = Some(Affordance::link(&sched.cta_label, &sched.cta_url));
        }
        scheduler
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_post_prompt(mut self, prompt: &str) -> Self {
        self.post_prompt = prompt.to_string();
        self
    }

    pub fn with_affordance(mut self, affordance: Affordance) -> Self {
        self.affordance = Some(affordance);
        self
    }

    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval = Duration::from_secs(interval_secs.max(1));
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Report cycle outcomes into `registry` under [`HEALTH_CHECK_NAME`].
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        registry.register(HealthCheck::ok(HEALTH_CHECK_NAME));
        self.health = Some(registry);
        self
    }

    /// Start from a given rotation state.
    pub fn with_state(mut self, state: SchedulerState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Pick this cycle's topic and flip the source for the next one.
    ///
    /// The flip happens before the source is consulted, so an empty or
    /// failing feed does not starve the curated list or vice versa.
    pub async fn select_topic(&mut self) -> Result<Topic, TopicSource> {
        let use_curated = self.state.use_curated;
        self.state.use_curated = !use_curated;

        if use_curated {
            if self.curated.is_empty() {
                return Err(TopicSource::Curated);
            }
            let text = self.curated[self.state.curated_index % self.curated.len()].clone();
            self.state.curated_index = self.state.curated_index.wrapping_add(1);
            return Ok(Topic {
                source: TopicSource::Curated,
                text,
            });
        }

        let titles = self.feed.fetch_titles().await;
        if titles.is_empty() {
            return Err(TopicSource::Feed);
        }
        let text = titles[self.state.feed_index % titles.len()].clone();
        self.state.feed_index = self.state.feed_index.wrapping_add(1);
        Ok(Topic {
            source: TopicSource::Feed,
            text,
        })
    }

    /// Run one full cycle: select, generate, gate, publish.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let topic = match self.select_topic().await {
            Ok(topic) => topic,
            Err(source) => {
                warn!(
                    component = "scheduler",
                    source = %source,
                    "No topic available, skipping publication"
                );
                return CycleOutcome::NoTopic(source);
            }
        };
        info!(
            component = "scheduler",
            source = %topic.source,
            "Selected topic: {}",
            topic.text
        );

        let mut messages = Vec::with_capacity(2);
        if !self.post_prompt.is_empty() {
            messages.push(Message::system(&self.post_prompt));
        }
        messages.push(Message::user(&topic.text));

        let post = match self
            .provider
            .chat(messages, self.model.as_deref(), self.options.clone())
            .await
        {
            Ok(response) => normalize_markup(&response.content),
            Err(e) => {
                error!(component = "scheduler", "Post generation failed: {}", e);
                return CycleOutcome::GenerationFailed(e.to_string());
            }
        };

        let verdict = self.gate.evaluate(&post);
        if !verdict.is_accepted() {
            info!(
                component = "scheduler",
                "Post rejected by quality gate: {}",
                verdict
            );
            return CycleOutcome::Rejected(verdict);
        }

        let mut outbound = OutboundMessage::new(
            self.channel.name(),
            &self.destination,
            &sanitize_telegram_html(&post),
        )
        .with_format(MessageFormat::Html);
        if let Some(affordance) = &self.affordance {
            outbound = outbound.with_affordance(affordance.clone());
        }

        match self.channel.send(outbound).await {
            Ok(()) => {
                log_component!(info, "scheduler", "Post published");
                CycleOutcome::Published(topic)
            }
            Err(e) => {
                error!(component = "scheduler", "Failed to publish post: {}", e);
                CycleOutcome::SendFailed(e.to_string())
            }
        }
    }

    /// Run one cycle with panic containment and failure bookkeeping.
    pub async fn run_guarded_cycle(&mut self) -> CycleOutcome {
        let outcome = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(component = "scheduler", "Scheduler cycle panicked");
                CycleOutcome::Panicked
            }
        };
        self.record(&outcome);
        outcome
    }

    fn record(&mut self, outcome: &CycleOutcome) {
        if !outcome.is_failure() {
            self.consecutive_failures = 0;
            if let Some(health) = &self.health {
                health.update(HEALTH_CHECK_NAME, HealthStatus::Ok, None);
            }
            return;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.failure_threshold {
            warn!(
                component = "scheduler",
                consecutive_failures = self.consecutive_failures,
                "Scheduler degraded"
            );
            if let Some(health) = &self.health {
                health.update(
                    HEALTH_CHECK_NAME,
                    HealthStatus::Degraded,
                    Some(format!("{} consecutive failed cycles", self.consecutive_failures)),
                );
            }
        }
    }

    /// Cycle, then wait the full interval, until `shutdown` flips to `true`.
    ///
    /// The first cycle runs immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            component = "scheduler",
            "Content scheduler started (interval={}s, destination={})",
            self.interval.as_secs(),
            self.destination
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.run_guarded_cycle().await;
            debug!(
                component = "scheduler",
                state = ?self.state,
                outcome = ?outcome,
                "Cycle finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(component = "scheduler", "Content scheduler stopped");
    }
}
