//! Command line host for the seat-race rating engine
//!
//! Reads seat racing sessions from a JSON file, extracts comparisons into an
//! in-memory store, recomputes the requested rating scopes (independent
//! scopes in parallel) and prints rankings as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use seat_race_engine::config::AppConfig;
use seat_race_engine::metrics::MetricsCollector;
use seat_race_engine::{
    InMemoryRatingStore, RankedAthlete, RatingEngine, RatingScope, RatingType, ScopeSide,
    SeatRaceSession,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Seat Race Engine - Elo and Bradley-Terry rankings from seat racing
#[derive(Parser)]
#[command(
    name = "seat-race-engine",
    version,
    about = "Rate rowers from seat racing results",
    long_about = "Extracts clean seat swaps from seat racing sessions and ranks athletes \
                 with an incremental Elo model and a Bradley-Terry maximum likelihood fit, \
                 per side and for the whole squad."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Sessions to rate
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "JSON file holding an array of seat race sessions"
    )]
    sessions: Option<PathBuf>,

    /// Restrict to one algorithm
    #[arg(
        short,
        long,
        value_name = "ALGORITHM",
        help = "Only compute one algorithm (elo, bradley-terry)"
    )]
    algorithm: Option<String>,

    /// Restrict to one side
    #[arg(
        long,
        value_name = "SIDE",
        help = "Only compute one side (all, port, starboard, coxswain)"
    )]
    side: Option<String>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without rating")]
    dry_run: bool,

    /// Print Prometheus metrics after rating
    #[arg(long, help = "Print metrics in Prometheus text format to stderr")]
    metrics: bool,
}

/// Rankings for one scope as printed on stdout
#[derive(Serialize)]
struct ScopeReport {
    scope: String,
    /// Only present for Bradley-Terry scopes
    converged: Option<bool>,
    rankings: Vec<RankedAthlete>,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Display startup banner with engine settings
fn display_startup_banner(config: &AppConfig) {
    let engine = &config.engine;
    info!("Seat Race Engine v{}", seat_race_engine::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Elo baseline: {}", engine.elo.baseline_rating);
    info!(
        "   Bradley-Terry: tolerance {:e}, max {} iterations, {} prior draws",
        engine.bradley_terry.tolerance,
        engine.bradley_terry.max_iterations,
        engine.bradley_terry.prior_draws
    );
    info!(
        "   Dead heat threshold: {}s",
        engine.extraction.dead_heat_seconds
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    Ok(config)
}

/// Scopes selected by the algorithm and side filters
fn selected_scopes(args: &Args) -> Result<Vec<RatingScope>> {
    let rating_type = args
        .algorithm
        .as_deref()
        .map(str::parse::<RatingType>)
        .transpose()?;
    let side = args
        .side
        .as_deref()
        .map(str::parse::<ScopeSide>)
        .transpose()?;

    Ok(RatingScope::all_scopes()
        .into_iter()
        .filter(|scope| rating_type.map_or(true, |t| scope.rating_type == t))
        .filter(|scope| side.map_or(true, |s| scope.side == s))
        .collect())
}

fn read_sessions(path: &Path) -> Result<Vec<SeatRaceSession>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sessions file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse sessions file {}", path.display()))
}

/// Recompute every scope, different scopes in parallel on the blocking pool
async fn recalculate_scopes(
    engine: &RatingEngine,
    scopes: Vec<RatingScope>,
) -> Result<Vec<ScopeReport>> {
    let handles: Vec<_> = scopes
        .into_iter()
        .map(|scope| {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || -> Result<ScopeReport> {
                engine.recalculate_scope(&scope)?;
                let converged = match scope.rating_type {
                    RatingType::BradleyTerry => engine.model(&scope)?.map(|m| m.converged()),
                    RatingType::SeatRaceElo => None,
                };
                Ok(ScopeReport {
                    scope: scope.to_string(),
                    converged,
                    rankings: engine.rankings(&scope)?,
                })
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await??);
    }
    Ok(reports)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        return Ok(());
    }

    let scopes = selected_scopes(&args).unwrap_or_else(|e| {
        error!("Invalid scope selection: {}", e);
        std::process::exit(2);
    });

    let Some(sessions_path) = &args.sessions else {
        error!("No sessions file given (use --sessions)");
        std::process::exit(2);
    };
    let sessions = read_sessions(sessions_path)?;

    let store = Arc::new(InMemoryRatingStore::new());
    let metrics = Arc::new(MetricsCollector::new()?);
    let engine = RatingEngine::with_metrics(config.engine.clone(), store.clone(), metrics.clone())?;

    for session in &sessions {
        let extraction = engine.import_session(session)?;
        if !extraction.excluded.is_empty() {
            warn!(
                "Session {} ({}): {} piece pairs excluded",
                session.id,
                session.name,
                extraction.excluded.len()
            );
        }
    }
    info!(
        "Imported {} sessions, {} comparisons",
        sessions.len(),
        store.comparison_count()?
    );

    let reports = recalculate_scopes(&engine, scopes).await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if args.metrics {
        eprintln!("{}", metrics.render()?);
    }

    Ok(())
}
