use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gotchi_daemon::{
    activity::{ActivityJournal, FanoutActivityLog, SharedActivityLog},
    bridge::{Bridge, ClientMessage, DaemonMessage},
    config::{AppConfig, DriverConfig},
    engine::{PlayerStateEngine, SharedSnapshotSink, Signal, SnapshotSink},
    storage::{self, SnapshotWriter},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!("Starting Gotchi daemon");

    let store = storage::open(&config.storage)
        .await
        .context("failed to open player store")?;
    let snapshot = storage::load_or_default(store.as_ref(), &config.engine).await;
    let (writer, writer_task) = SnapshotWriter::spawn(store);
    let writer: SharedSnapshotSink = Arc::new(writer);

    let mut bridge = Bridge::bind(config.bridge.clone()).await?;

    let mut loggers: Vec<SharedActivityLog> = vec![Arc::new(bridge.activity_feed())];
    let mut journal_task: Option<JoinHandle<()>> = None;
    if config.activity.enabled {
        let journal = ActivityJournal::open(config.activity.dir.clone()).await?;
        let (handle, task) = journal.spawn();
        loggers.push(Arc::new(handle));
        journal_task = Some(task);
    }

    let mut engine = PlayerStateEngine::new(config.engine.clone(), snapshot)
        .with_activity_log(Arc::new(FanoutActivityLog(loggers)))
        .with_snapshot_sink(writer.clone());
    info!(
        level = engine.player().level,
        hp = engine.player().hp,
        "Player ready"
    );

    let mut driver = Driver::new(&config.driver);
    let tick_interval = config.driver.tick_interval();
    let mut next_tick = tokio::time::Instant::now() + tick_interval;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick) => {
                let (signal, dt) = driver.next_tick(Instant::now());
                engine.update(signal, dt);
                bridge.broadcast(DaemonMessage::State { state: engine.get_state() });
                next_tick = tokio::time::Instant::now() + tick_interval;
            }
            next = bridge.next_message() => {
                match next {
                    Some(msg) => handle_client_message(msg, &mut engine, &mut driver, &bridge),
                    None => break,
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    writer.submit(engine.snapshot());
    drop(engine);
    drop(writer);
    if let Err(err) = writer_task.await {
        warn!(?err, "Snapshot writer did not finish cleanly");
    }
    if let Some(task) = journal_task {
        if let Err(err) = task.await {
            warn!(?err, "Activity journal did not finish cleanly");
        }
    }
    info!("Gotchi daemon stopped");
    Ok(())
}

/// Turns wall-clock ticks and sporadic classifier readings into the
/// `(signal, dt)` pairs the engine consumes.
struct Driver {
    last_tick: Instant,
    latest: Option<(Signal, Instant)>,
    max_tick_secs: f64,
    stale_after: std::time::Duration,
}

impl Driver {
    fn new(config: &DriverConfig) -> Self {
        Self {
            last_tick: Instant::now(),
            latest: None,
            max_tick_secs: config.max_tick_secs,
            stale_after: config.signal_stale(),
        }
    }

    fn observe(&mut self, signal: Signal, at: Instant) {
        self.latest = Some((signal, at));
    }

    fn next_tick(&mut self, now: Instant) -> (Signal, f64) {
        // Clamp so a suspended laptop does not resume with one enormous tick.
        let dt = now
            .saturating_duration_since(self.last_tick)
            .as_secs_f64()
            .min(self.max_tick_secs);
        self.last_tick = now;

        let signal = match self.latest {
            Some((signal, at)) if now.saturating_duration_since(at) <= self.stale_after => signal,
            _ => Signal::default(),
        };
        (signal, dt)
    }
}

fn handle_client_message(
    message: ClientMessage,
    engine: &mut PlayerStateEngine,
    driver: &mut Driver,
    bridge: &Bridge,
) {
    if let Some(signal) = message.as_signal() {
        driver.observe(signal, Instant::now());
        return;
    }

    match message {
        ClientMessage::Ping { nonce } => {
            bridge.broadcast(DaemonMessage::Pong { nonce });
        }
        ClientMessage::AcceptQuest { index } => {
            let success = usize::try_from(index)
                .map(|i| engine.accept_quest(i))
                .unwrap_or(false);
            bridge.broadcast(DaemonMessage::QuestAcceptResult { index, success });
            if success {
                bridge.log("info", format!("Quest {index} accepted"));
            } else {
                bridge.log("warn", format!("Quest {index} could not be accepted"));
            }
            bridge.broadcast(DaemonMessage::State {
                state: engine.get_state(),
            });
        }
        ClientMessage::GetState => {
            bridge.broadcast(DaemonMessage::State {
                state: engine.get_state(),
            });
        }
        ClientMessage::Signal { .. } => {}
    }
}
