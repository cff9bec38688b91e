use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use adaptive_ensemble::config::Config;
use adaptive_ensemble::features::RollingFeaturePipeline;
use adaptive_ensemble::model::{Direction, MarketData, Outcome};
use adaptive_ensemble::pipeline::wall_clock_ms;
use adaptive_ensemble::predictor::BaselineModelRuntime;
use adaptive_ensemble::store::SqliteOutcomeStore;
use adaptive_ensemble::{AdaptiveEngine, EngineError};

const DEFAULT_SYNTHETIC_STEPS: usize = 500;
const SYNTHETIC_INSTRUMENT: &str = "ES";
const SYNTHETIC_STEP_MS: u64 = 1_000;

/// Deterministic xorshift walk with slowly switching drift.
fn synthetic_walk(steps: usize) -> Vec<MarketData> {
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next_unit = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed >> 11) as f64 / (1u64 << 53) as f64
    };
    let start_ms = wall_clock_ms().saturating_sub(steps as u64 * SYNTHETIC_STEP_MS);
    let mut price = 4_500.0;
    let mut drift = 0.0004;
    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        if i % 120 == 119 {
            drift = -drift;
        }
        let noise = (next_unit() - 0.5) * 0.002;
        price *= 1.0 + drift + noise;
        let volume = 800.0 + next_unit() * 400.0;
        out.push(MarketData::new(
            SYNTHETIC_INSTRUMENT,
            price,
            volume,
            start_ms + i as u64 * SYNTHETIC_STEP_MS,
        ));
    }
    out
}

fn read_observations(path: &PathBuf) -> Result<Vec<MarketData>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let market: MarketData = serde_json::from_str(&line)
            .with_context(|| format!("{}:{} is not a market observation", path.display(), n + 1))?;
        out.push(market);
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct ReplaySummary {
    observations: usize,
    predictions: usize,
    warming_up: usize,
    failed: usize,
    scored: usize,
    recommendations: BTreeMap<&'static str, usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set ENGINE_CONFIG_PATH or provide config/default.toml");
            std::process::exit(1);
        }
    };

    let log_file = std::fs::File::create(&config.logging.file)
        .with_context(|| format!("failed to create {}", config.logging.file))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let mut args = std::env::args().skip(1);
    let observations = match args.next() {
        Some(path) => read_observations(&PathBuf::from(path))?,
        None => synthetic_walk(DEFAULT_SYNTHETIC_STEPS),
    };
    tracing::info!(
        observations = observations.len(),
        roles = ?config.engine.model_roles,
        store = %config.store.path,
        "Starting adaptive-ensemble replay"
    );

    let store = Arc::new(SqliteOutcomeStore::open(config.store_settings())?);
    let engine = AdaptiveEngine::from_config(
        &config,
        Arc::new(RollingFeaturePipeline::default()),
        Arc::new(BaselineModelRuntime::default()),
        store,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = engine.spawn_learning_sweep(config.sweep_interval()?, shutdown_rx);
    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received");
        let _ = ctrl_c_shutdown.send(true);
    });

    let mut summary = ReplaySummary::default();
    let mut last_price: BTreeMap<String, f64> = BTreeMap::new();
    for market in &observations {
        if *shutdown_tx.borrow() {
            break;
        }
        summary.observations += 1;
        let instrument = market.instrument_key();

        if let (Some(prev), Some(price), Some(ts)) = (
            last_price.get(&instrument).copied(),
            market.price,
            market.timestamp_ms,
        ) {
            let move_ = price - prev;
            let outcome = Outcome::new(Direction::from_sign(move_), move_, ts);
            summary.scored += engine.resolve_outcome(&instrument, &outcome).await;
        }
        if let Some(price) = market.price {
            last_price.insert(instrument.clone(), price);
        }

        match engine.generate_prediction(market).await {
            Ok(prediction) => {
                summary.predictions += 1;
                *summary
                    .recommendations
                    .entry(prediction.recommendation.as_str())
                    .or_default() += 1;
            }
            Err(EngineError::FeatureExtraction { .. }) => summary.warming_up += 1,
            Err(e) => {
                tracing::warn!(instrument = %instrument, error = %e, "Prediction failed");
                summary.failed += 1;
            }
        }
    }

    engine.flush_pending_writes().await;
    let sweep_report = engine.perform_online_learning().await;
    let _ = shutdown_tx.send(true);
    sweep.await.context("learning sweep task panicked")?;

    println!("observations      {}", summary.observations);
    println!("predictions       {}", summary.predictions);
    println!("warming up        {}", summary.warming_up);
    println!("failed            {}", summary.failed);
    println!("outcomes scored   {}", summary.scored);
    println!(
        "final sweep       {} updated of {}",
        sweep_report.updated(),
        sweep_report.results.len()
    );
    for (rec, n) in &summary.recommendations {
        println!("  {:<12} {}", rec, n);
    }
    let performance = engine.registry().performance_snapshot();
    for (model_id, weight) in engine.get_model_weights() {
        let acc = performance.get(&model_id).copied().unwrap_or(0.5);
        println!("  {:<24} weight {:.3}  accuracy {:.3}", model_id, weight, acc);
    }
    tracing::info!("Replay complete");
    Ok(())
}
