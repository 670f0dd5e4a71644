//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Orchestrator start-up, scheduler loop and public handle."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use nmea_codec::{Catalog, ParsedReading};
use nmea_common::config::{AppConfig, Mode, ProtocolMode};
use nmea_common::time::{jitter_us, secs_to_duration};
use nmea_metrics::{BridgeMetrics, SharedRegistry};
use nmea_net::{BoundAddresses, BridgeHandle, ConnectionRegistry, OutboundMessage, TransportBridge};
use nmea_rt::{RateLimiter, TaskGroup};
use nmea_sim::{AutopilotIntent, AutopilotState, ScenarioEngine};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::router::InboundRouter;
use crate::simulation::{ScenarioSnapshot, SharedSimulation, Simulation};

const READING_CHANNEL_CAPACITY: usize = 1024;
const MIN_TICK: Duration = Duration::from_millis(20);
const MAX_TICK: Duration = Duration::from_secs(1);

/// Wires catalog, simulation, router and transports together.
#[derive(Debug)]
pub struct BridgeOrchestrator {
    config: Arc<AppConfig>,
    metrics_registry: Option<SharedRegistry>,
    engine: Option<ScenarioEngine>,
}

impl BridgeOrchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics_registry: None,
            engine: None,
        }
    }

    /// Register bridge metrics in a shared registry instead of a private one.
    pub fn with_metrics(mut self, registry: SharedRegistry) -> Self {
        self.metrics_registry = Some(registry);
        self
    }

    /// Use an already loaded scenario instead of `simulation.scenario`.
    pub fn with_engine(mut self, engine: ScenarioEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Load the scenario, bind every transport and start the scheduler.
    /// Nothing keeps running when this returns an error.
    pub async fn start(self) -> Result<OrchestratorHandle> {
        let config = self.config;
        let checked = if self.engine.is_some() {
            config.validate_sections()
        } else {
            config.validate()
        };
        checked.context("invalid bridge configuration")?;

        let metrics = match &self.metrics_registry {
            Some(registry) => BridgeMetrics::new(registry.clone())?,
            None => BridgeMetrics::detached()?,
        };
        let catalog = Arc::new(Catalog::standard());

        let engine = if config.mode.runs_simulation() {
            match (self.engine, &config.simulation.scenario) {
                (Some(engine), _) => Some(engine),
                (None, Some(path)) => Some(
                    ScenarioEngine::load_scenario(path, config.simulation.seed)
                        .with_context(|| format!("failed to load scenario {}", path.display()))?,
                ),
                (None, None) => None,
            }
        } else {
            if self.engine.is_some() {
                warn!("scenario ignored in bridge mode");
            }
            None
        };
        let tick_period = tick_period(&config, engine.as_ref());

        let mut simulation = Simulation::new(config.autopilot.clone(), engine);
        simulation
            .start(&catalog)
            .context("failed to start scenario")?;
        let simulation = simulation.into_shared();

        let registry = Arc::new(ConnectionRegistry::new(&config.connection, metrics.clone()));
        let (readings, _) = broadcast::channel(READING_CHANNEL_CAPACITY);
        let router = Arc::new(InboundRouter::new(
            catalog.clone(),
            simulation.clone(),
            registry.clone(),
            readings,
            config.mode,
            config.protocol,
        ));
        let bridge = TransportBridge::start(&config, registry.clone(), router.clone())
            .await
            .context("failed to start transports")?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = TaskGroup::new();
        if config.mode.runs_simulation() {
            let scheduler = Scheduler {
                catalog,
                simulation: simulation.clone(),
                registry: registry.clone(),
                protocol: config.protocol,
                speedup: config.simulation.speedup,
                loop_scenario: config.simulation.loop_scenario,
                tick_period,
                status_period: config.simulation.autopilot_interval,
            };
            tasks.spawn("scheduler", scheduler.run(shutdown_rx));
        }

        let tick_ms = tick_period.as_millis() as u64;
        info!(
            mode = ?config.mode,
            protocol = ?config.protocol,
            tick_ms,
            addresses = ?bridge.addresses(),
            "orchestrator started"
        );

        Ok(OrchestratorHandle {
            config,
            simulation,
            router,
            bridge,
            metrics,
            metrics_registry: self.metrics_registry,
            shutdown,
            tasks,
        })
    }
}

/// Scheduler period: configured, else the fastest channel interval within
/// 20 ms..1 s, else one second.
fn tick_period(config: &AppConfig, engine: Option<&ScenarioEngine>) -> Duration {
    if let Some(period) = config.simulation.tick_interval {
        return period;
    }
    engine
        .and_then(|engine| engine.config().min_interval())
        .map(|seconds| secs_to_duration(seconds).clamp(MIN_TICK, MAX_TICK))
        .unwrap_or(MAX_TICK)
}

/// Running bridge. Dropping it without [`OrchestratorHandle::shutdown`] leaves
/// tasks running until the runtime stops.
#[derive(Debug)]
pub struct OrchestratorHandle {
    config: Arc<AppConfig>,
    simulation: SharedSimulation,
    router: Arc<InboundRouter>,
    bridge: BridgeHandle,
    metrics: BridgeMetrics,
    metrics_registry: Option<SharedRegistry>,
    shutdown: watch::Sender<bool>,
    tasks: TaskGroup,
}

impl OrchestratorHandle {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn addresses(&self) -> BoundAddresses {
        self.bridge.addresses()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.bridge.registry()
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    pub fn metrics_registry(&self) -> Option<SharedRegistry> {
        self.metrics_registry.clone()
    }

    /// Every reading parsed from inbound traffic from now on.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<ParsedReading> {
        self.router.subscribe()
    }

    /// Apply a command as if it had arrived over the wire.
    pub fn send_autopilot_command(&self, intent: AutopilotIntent) -> AutopilotState {
        self.router.send_autopilot_command(intent)
    }

    pub fn autopilot_state(&self) -> AutopilotState {
        self.simulation.lock().autopilot().clone()
    }

    pub fn scenario_state(&self) -> Option<ScenarioSnapshot> {
        self.simulation.lock().scenario()
    }

    /// Stop scenario emission. No scenario sentence is queued after this returns.
    pub fn stop_scenario(&self) {
        self.simulation.lock().stop();
    }

    pub fn broadcast(&self, message: OutboundMessage) {
        self.bridge.broadcast(message);
    }

    pub async fn shutdown(self) -> Result<()> {
        self.simulation.lock().stop();
        let _ = self.shutdown.send(true);
        let scheduler = self.tasks.join().await;
        let transports = self.bridge.shutdown().await;
        info!("orchestrator shutdown complete");
        scheduler.and(transports)
    }
}

struct Scheduler {
    catalog: Arc<Catalog>,
    simulation: SharedSimulation,
    registry: Arc<ConnectionRegistry>,
    protocol: ProtocolMode,
    speedup: f64,
    loop_scenario: bool,
    tick_period: Duration,
    status_period: Duration,
}

impl Scheduler {
    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut limiter = RateLimiter::new(self.tick_period);
        let mut last_tick: Option<Instant> = None;
        let mut last_status = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("scheduler shutdown signal received");
                    break;
                }
                _ = limiter.tick() => {
                    let now = Instant::now();
                    let elapsed = last_tick.map(|last| now.duration_since(last)).unwrap_or_default();
                    if last_tick.is_some() {
                        debug!(jitter_us = jitter_us(elapsed, self.tick_period), "scheduler tick");
                    }
                    last_tick = Some(now);
                    let status_due = now.duration_since(last_status) >= self.status_period;
                    if status_due {
                        last_status = now;
                    }
                    self.pass(elapsed, status_due);
                }
            }
        }
        Ok(())
    }

    /// Generation and fan-out happen under the simulation lock.
    fn pass(&self, elapsed: Duration, status_due: bool) {
        let wall = Utc::now();
        let mut simulation = self.simulation.lock();
        if simulation.is_stopped() {
            return;
        }
        let delta = elapsed.as_secs_f64() * self.speedup;
        let advance = simulation.advance(delta, &self.catalog, wall, self.protocol, self.loop_scenario);
        if advance.report.completed && !advance.restarted {
            info!("scenario complete");
        }
        let mut messages = advance.messages;
        if status_due {
            messages.extend(simulation.status_messages(&self.catalog, wall, self.protocol));
        }
        for message in messages {
            self.registry.broadcast(message);
        }
    }
}
