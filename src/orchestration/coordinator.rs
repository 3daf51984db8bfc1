//! # Coordinator
//!
//! ## Architecture: One Control Loop, Many Periodic Tasks
//!
//! The Coordinator owns every control-loop component and runs them as
//! independent periodic tasks on the shared runtime. Tasks execute
//! concurrently, but each agent's state transitions serialize through the
//! registry's compare-and-swap, so the loop parallelizes across agents
//! without a global lock. The persistence layer is the only suspension
//! point; a failing store degrades ticks (retry, then skip with in-memory
//! state) rather than stopping them.
//!
//! ## Key Integration Points:
//! - **AgentRegistry**: authoritative state, CAS transitions
//! - **HeartbeatMonitor -> OptimizationEngine**: staleness triggers over mpsc
//! - **AnomalyDetector -> OptimizationEngine**: anomaly triggers over mpsc
//! - **RecoveryDelegate**: the egress capability agents implement
//! - **Shutdown**: a watch signal every task checks between ticks

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::constants::event_types;
use crate::database::connection::DatabaseConnection;
use crate::database::migrations::DatabaseMigrations;
use crate::database::store::{CoordinationStore, PgStore};
use crate::error::Result;
use crate::events::publisher::{EventPublisher, PublishedEvent};
use crate::events::recorder::EventRecorder;
use crate::metrics::aggregator::MetricsAggregator;
use crate::models::core::agent::{Agent, NewAgent};
use crate::models::core::agent_heartbeat::HeartbeatReport;
use crate::models::core::performance_metric::MetricSample;
use crate::models::core::system_event::{EventSeverity, NewSystemEvent, SystemEvent};
use crate::models::insights::agent_status_dashboard::AgentStatusRow;
use crate::models::insights::performance_summary::PerformanceSummaryRow;
use crate::models::insights::system_health_overview::SystemHealthOverview;
use crate::monitoring::anomaly_detector::AnomalyDetector;
use crate::monitoring::heartbeat_monitor::HeartbeatMonitor;
use crate::optimization::actions::RecoveryDelegate;
use crate::optimization::engine::OptimizationEngine;
use crate::optimization::OptimizationTrigger;
use crate::registry::agent_registry::AgentRegistry;
use crate::resilience::retry::{with_retry, RetryPolicy, StoreHealth};
use crate::state_machine::states::AgentState;

const TRIGGER_CHANNEL_CAPACITY: usize = 256;
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// The coordination engine facade.
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<AgentRegistry>,
    aggregator: Arc<MetricsAggregator>,
    recorder: Arc<EventRecorder>,
    monitor: Arc<HeartbeatMonitor>,
    detector: Arc<AnomalyDetector>,
    engine: Arc<OptimizationEngine>,
    retry: RetryPolicy,
    trigger_rx: Mutex<Option<mpsc::Receiver<OptimizationTrigger>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Assemble the engine over any store implementation. Validates the
    /// configuration up front; invalid thresholds fail here, before any task
    /// starts.
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn CoordinationStore>,
        delegate: Arc<dyn RecoveryDelegate>,
    ) -> Result<Self> {
        config.validate()?;

        let publisher = EventPublisher::new(config.event_channel_capacity);
        let store_health = Arc::new(StoreHealth::new(config.store_failure_threshold));
        let retry = RetryPolicy::new(config.store_retry_attempts);
        let recorder = Arc::new(EventRecorder::new(
            publisher,
            store.clone(),
            retry.clone(),
            store_health,
        ));

        let registry = Arc::new(AgentRegistry::new(
            store.clone(),
            recorder.clone(),
            retry.clone(),
        ));
        let aggregator = Arc::new(MetricsAggregator::new());

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        let monitor = Arc::new(HeartbeatMonitor::new(
            registry.clone(),
            aggregator.clone(),
            recorder.clone(),
            store.clone(),
            trigger_tx.clone(),
            &config,
        ));
        let detector = Arc::new(AnomalyDetector::new(
            aggregator.clone(),
            recorder.clone(),
            trigger_tx,
            &config,
        ));
        let engine = Arc::new(OptimizationEngine::new(
            registry.clone(),
            store.clone(),
            recorder.clone(),
            delegate,
            &config,
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            registry,
            aggregator,
            recorder,
            monitor,
            detector,
            engine,
            retry,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Connect to PostgreSQL, run migrations, hydrate the registry, and
    /// assemble the engine.
    pub async fn bootstrap(
        config: CoordinatorConfig,
        delegate: Arc<dyn RecoveryDelegate>,
    ) -> Result<Self> {
        config.validate()?;

        let connection = DatabaseConnection::new(&config).await?;
        DatabaseMigrations::run_all(connection.pool()).await?;
        let store = Arc::new(PgStore::new(connection.pool().clone(), config.store_timeout()));

        let coordinator = Self::new(config, store, delegate)?;
        coordinator.registry.hydrate().await?;
        Ok(coordinator)
    }

    // ---- Ingress (agent-facing) ----

    pub async fn register(&self, new_agent: NewAgent) -> Result<Agent> {
        self.registry.register(new_agent, Utc::now()).await
    }

    /// Ingest a heartbeat: registry liveness update (max-wins `last_seen`,
    /// recovery-by-heartbeat) plus built-in metric derivation.
    pub async fn heartbeat(&self, report: HeartbeatReport) -> Result<Agent> {
        let now = Utc::now();
        let agent = self.registry.record_heartbeat(&report, now).await?;
        self.aggregator.ingest_heartbeat(&report.clamped(), now);
        Ok(agent)
    }

    /// Ingest one metric sample into the in-process windows and the durable
    /// raw stream.
    pub async fn report_metric(&self, sample: MetricSample) -> Result<()> {
        let now = Utc::now();
        self.aggregator.ingest_sample(&sample, now);

        with_retry(&self.retry, "append_metric", || {
            let store = self.store.clone();
            let sample = sample.clone();
            async move { store.append_metric(&sample).await }
        })
        .await
    }

    /// At-least-once batch ingestion; samples persist concurrently.
    pub async fn report_metrics(&self, samples: Vec<MetricSample>) -> Result<()> {
        futures::future::try_join_all(samples.into_iter().map(|sample| self.report_metric(sample)))
            .await?;
        Ok(())
    }

    pub async fn deregister(&self, agent_id: &str) -> Result<Agent> {
        self.registry.deregister(agent_id, Utc::now()).await
    }

    // ---- Registry passthrough ----

    pub fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        self.registry.get(agent_id)
    }

    pub fn list_agents(&self, filter_by_state: Option<AgentState>) -> Vec<Agent> {
        self.registry.list(filter_by_state)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    /// Subscribe to the in-process event bus.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PublishedEvent> {
        self.recorder.publisher().subscribe()
    }

    // ---- Dashboards (read-only; never feed the control loop) ----

    pub async fn get_agent_status_dashboard(&self) -> Result<Vec<AgentStatusRow>> {
        self.store.agent_status_dashboard().await
    }

    pub async fn get_performance_summary(&self, window_hours: i64) -> Result<Vec<PerformanceSummaryRow>> {
        self.store.performance_summary(window_hours).await
    }

    pub async fn get_system_health_overview(&self) -> Result<SystemHealthOverview> {
        self.store.system_health_overview().await
    }

    pub async fn get_recent_events(
        &self,
        min_severity: Option<EventSeverity>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SystemEvent>> {
        self.store.recent_events(min_severity, since, 100).await
    }

    // ---- Lifecycle ----

    /// Spawn the periodic tasks. Idempotent per process: calling twice just
    /// adds no second set because the trigger receiver is consumed once.
    pub fn start(&self) {
        let Some(mut trigger_rx) = self.trigger_rx.lock().take() else {
            warn!("coordinator already started");
            return;
        };

        info!(
            heartbeat_interval_seconds = self.config.heartbeat_interval_seconds,
            cooldown_seconds = self.config.optimization_cooldown_seconds,
            "starting coordination control loop"
        );

        let mut tasks = self.tasks.lock();

        // Heartbeat monitor tick.
        {
            let monitor = self.monitor.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            let period = self.config.heartbeat_interval();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            monitor.evaluate(Utc::now()).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("heartbeat monitor task stopped");
            }));
        }

        // Anomaly evaluation tick.
        {
            let detector = self.detector.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            let period = self.config.heartbeat_interval();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            detector.evaluate(Utc::now()).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("anomaly detector task stopped");
            }));
        }

        // Optimization trigger processing.
        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        maybe_trigger = trigger_rx.recv() => {
                            match maybe_trigger {
                                Some(trigger) => engine.handle_trigger(&trigger, Utc::now()).await,
                                None => break,
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("optimization trigger task stopped");
            }));
        }

        // Recovery verification sweep.
        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            let period = Duration::from_secs(
                (self.config.recovery_verification_grace_seconds / 2).max(1),
            );
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            engine.run_verifications(Utc::now()).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("verification sweep task stopped");
            }));
        }

        // Retention sweep.
        {
            let store = self.store.clone();
            let recorder = self.recorder.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            let metrics_days = self.config.metrics_retention_days;
            let events_days = self.config.events_retention_days;
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first interval tick fires immediately; run the sweep on
                // the daily cadence after that.
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            match store.cleanup_old_data(metrics_days, events_days).await {
                                Ok(removed) => {
                                    recorder
                                        .record(
                                            NewSystemEvent::new(
                                                event_types::RETENTION_SWEEP,
                                                EventSeverity::Info,
                                                Utc::now(),
                                            )
                                            .with_context(serde_json::json!({
                                                "rows_removed": removed,
                                            })),
                                        )
                                        .await;
                                }
                                Err(err) => {
                                    warn!(error = %err, "retention sweep failed");
                                }
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("retention sweep task stopped");
            }));
        }
    }

    /// Cooperative shutdown: signal every task and wait for them to finish
    /// their current tick.
    pub async fn shutdown(&self) {
        info!("coordination control loop shutting down");
        let _ = self.shutdown_tx.send(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "control-loop task join failed");
            }
        }

        self.recorder.flush_buffered().await;
    }
}
