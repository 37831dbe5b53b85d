//! affect-layer demo host.
//!
//! Drives an [`AffectContext`] in wall-clock time with a synthetic metrics
//! feed and random-ish interactions, logging every persona frame. Raises
//! one critical alert half way through to show the override and revert.
//!
//! # Environment Variables
//!
//! - `AFFECT_CONFIG` — optional YAML configuration file
//! - `AFFECT_PREFS_PATH` — SQLite preference database (in-memory store if unset)
//! - `AFFECT_DEMO_SECS` — how long to run (default: 15)
//! - `AFFECT_*` — configuration overrides, see `affect_layer::config`
//! - `RUST_LOG` — tracing filter (default: "info,affect_layer=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin affect_demo
//! AFFECT_PREFS_PATH=./affect.db AFFECT_DEMO_SECS=30 cargo run --bin affect_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::Mutex;

use affect_layer::archetype::InteractionKind;
use affect_layer::bridge::{AlertSeverity, EventKind, EventPayload};
use affect_layer::config::AffectConfig;
use affect_layer::runtime::{spawn_driver, AffectContext};
use affect_layer::state::SystemMetrics;
use affect_layer::storage::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore};

const FEED_PERIOD: Duration = Duration::from_millis(500);

fn load_config() -> anyhow::Result<AffectConfig> {
    let mut config = match std::env::var("AFFECT_CONFIG") {
        Ok(path) => AffectConfig::from_yaml_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        Err(_) => AffectConfig::default(),
    };
    config.apply_env().context("applying AFFECT_* overrides")?;
    Ok(config)
}

fn open_store() -> Box<dyn PreferenceStore> {
    match std::env::var("AFFECT_PREFS_PATH") {
        Ok(path) => match SqlitePreferenceStore::open(&path) {
            Ok(store) => {
                tracing::info!("Preferences stored in {}", store.db_path);
                Box::new(store)
            }
            Err(e) => {
                tracing::warn!("Cannot open {}: {}; preferences will not persist", path, e);
                Box::new(MemoryPreferenceStore::new())
            }
        },
        Err(_) => Box::new(MemoryPreferenceStore::new()),
    }
}

/// Metrics for step `i`: a slow load wave with an error burst near the peak.
fn synthetic_metrics(i: u64) -> SystemMetrics {
    let phase = i as f64 / 20.0;
    let cpu = 50.0 + 45.0 * phase.sin();
    let memory = 40.0 + 20.0 * (phase / 2.0).cos();
    SystemMetrics {
        cpu,
        memory,
        errors: if cpu > 92.0 { 2 } else { 0 },
        connections: (i % 80) as u32,
    }
}

fn synthetic_interaction(i: u64) -> Option<InteractionKind> {
    match i % 7 {
        0 | 3 => Some(InteractionKind::Scroll),
        1 => Some(InteractionKind::Click),
        5 => Some(InteractionKind::Hover),
        6 if i % 3 == 0 => Some(InteractionKind::Keypress),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,affect_layer=debug".into()),
        )
        .init();

    let config = load_config()?;
    let run_for: u64 = std::env::var("AFFECT_DEMO_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(15);
    let store = open_store();

    let mut context = AffectContext::new(config)?;
    let prefs = context.load_preferences(store.as_ref());
    tracing::info!(
        "Starting with evolution {:.4}, sound {}",
        prefs.evolution,
        if prefs.sound_enabled { "on" } else { "off" }
    );

    context.subscribe(EventKind::PersonaSynced, "log-frames", |event| {
        if let EventPayload::PersonaSynced { channels } = &event.payload {
            tracing::info!(at_ms = event.timestamp_ms, ?channels, "persona frame");
        }
    });
    context.subscribe(EventKind::StateChanged, "log-state", |event| {
        if let EventPayload::StateChanged { from, to } = &event.payload {
            tracing::info!("state {} -> {}", from, to);
        }
    });
    context.start();

    let context = Arc::new(Mutex::new(context));
    let driver = spawn_driver(context.clone(), Duration::from_millis(50));

    let steps = run_for * 1_000 / FEED_PERIOD.as_millis() as u64;
    let mut ticker = tokio::time::interval(FEED_PERIOD);
    for i in 0..steps {
        ticker.tick().await;
        let mut ctx = context.lock();
        ctx.ingest_metrics(synthetic_metrics(i));
        if let Some(kind) = synthetic_interaction(i) {
            ctx.record_interaction(kind);
        }
        if i == steps / 2 {
            ctx.emit_alert(AlertSeverity::Critical, "synthetic disk pressure");
        }
    }

    driver.shutdown().await.context("driver task failed")?;

    let mut ctx = context.lock();
    let snapshot = ctx.snapshot();
    tracing::info!(
        "Final: state {}, mood {} ({:.2}), temperament {}, posture {}",
        snapshot.state,
        snapshot.mood.current,
        snapshot.mood.intensity,
        snapshot.personality.temperament,
        snapshot.posture
    );
    ctx.destroy();
    ctx.save_preferences(store.as_ref());
    Ok(())
}
