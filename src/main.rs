//! Smart Room Core - Main Entry Point

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use smartroom_core::constants::{APP_VERSION, DEFAULT_INTERVAL_SECS};
use smartroom_core::logic::alert::{AlertChannel, LogChannel, WebhookChannel};
use smartroom_core::logic::config::EngineConfig;
use smartroom_core::logic::evaluation::Evaluation;
use smartroom_core::logic::latch::AlertLatch;
use smartroom_core::logic::ledger::SqliteLedger;
use smartroom_core::logic::source::{CsvTrainingSource, SqliteReadingSource};
use smartroom_core::logic::DetectionOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "smartroom-core", version, about = "Smart room anomaly detection engine")]
struct Cli {
    /// SQLite database (readings + anomalies)
    #[arg(long, global = true, env = "SMARTROOM_DB_PATH")]
    db: Option<PathBuf>,

    /// Sensor profiles JSON
    #[arg(long, global = true, env = "SMARTROOM_PROFILES")]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run detection cycles on a fixed interval
    Run {
        #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
        interval_secs: u64,

        /// Stop after this many cycles (0 = run forever)
        #[arg(long, default_value_t = 0)]
        cycles: u64,

        /// Training CSV
        #[arg(long, env = "SMARTROOM_TRAINING_CSV")]
        training: Option<PathBuf>,
    },
    /// Score both detectors against a labeled test set
    Evaluate {
        #[arg(long)]
        train: PathBuf,

        #[arg(long)]
        test: PathBuf,

        #[arg(long, default_value = "anomaly_detection_results.csv")]
        output: PathBuf,
    },
    /// Store sensor JSON messages (arguments, or one per stdin line)
    Ingest {
        messages: Vec<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if cli.profiles.is_some() {
        config.profiles_path = cli.profiles;
    }

    log::info!("Starting Smart Room Core v{}...", APP_VERSION);

    match cli.command {
        Command::Run {
            interval_secs,
            cycles,
            training,
        } => {
            if let Some(path) = training {
                config.training_csv = path;
            }
            run(&config, interval_secs, cycles)
        }
        Command::Evaluate { train, test, output } => {
            let report = Evaluation::sound(config.seed)
                .run(&train, &test, &output)
                .context("evaluation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ingest { messages } => ingest(&config, messages),
    }
}

fn run(config: &EngineConfig, interval_secs: u64, cycles: u64) -> Result<()> {
    let profiles = config.load_profiles().context("invalid sensor profiles")?;

    // Unreachable stores are fatal at startup
    let ledger = SqliteLedger::open(&config.db_path)
        .with_context(|| format!("cannot open anomaly ledger at {}", config.db_path.display()))?;
    let readings = SqliteReadingSource::open(&config.db_path)
        .with_context(|| format!("cannot open reading store at {}", config.db_path.display()))?;

    let channel: Box<dyn AlertChannel> = match &config.alert_url {
        Some(url) => {
            log::info!("Alerts delivered to {}", url);
            Box::new(WebhookChannel::new(url))
        }
        None => {
            log::info!("No alert URL configured, alerts are logged only");
            Box::new(LogChannel)
        }
    };

    let mut engine = DetectionOrchestrator::new(
        profiles,
        Box::new(readings),
        Box::new(ledger),
        channel,
        Arc::new(AlertLatch::new()),
    )?
    .with_seed(config.seed);

    let training = CsvTrainingSource::new(&config.training_csv);
    for (sensor, state) in engine.train(&training)? {
        log::info!("[{}] classifier: {:?}", sensor, state);
    }

    let mut completed = 0u64;
    loop {
        let report = engine.run_cycle();
        let mut anomalous = 0usize;
        for (sensor, outcome) in &report.passes {
            log::debug!("[{}] {}", sensor, outcome.label());
            if outcome.result().is_some_and(|r| r.is_anomalous()) {
                anomalous += 1;
            }
        }
        if anomalous > 0 || report.failures() > 0 {
            log::info!(
                "Cycle {}: {} anomalous pass(es), {} record(s), {} failed pass(es)",
                completed + 1,
                anomalous,
                report.records_written(),
                report.failures()
            );
        }
        if report.alert_fired() {
            log::warn!("Cycle {}: alert latch fired, detection suppressed until reset", completed + 1);
        }

        completed += 1;
        if cycles > 0 && completed >= cycles {
            break;
        }
        thread::sleep(Duration::from_secs(interval_secs));
    }

    log::info!("Detection stopped after {} cycle(s)", completed);
    Ok(())
}

fn ingest(config: &EngineConfig, messages: Vec<String>) -> Result<()> {
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create data directory {}", parent.display()))?;
    }
    let store = SqliteReadingSource::open(&config.db_path)
        .with_context(|| format!("cannot open reading store at {}", config.db_path.display()))?;

    let lines: Vec<String> = if messages.is_empty() {
        std::io::stdin().lock().lines().collect::<std::io::Result<_>>()?
    } else {
        messages
    };

    let mut stored = 0usize;
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        match store.ingest_json(line) {
            Ok(_) => stored += 1,
            Err(e) => log::warn!("Skipping message: {}", e),
        }
    }

    log::info!("Stored {} reading(s) in {}", stored, config.db_path.display());
    if stored == 0 && !lines.is_empty() {
        anyhow::bail!("no valid sensor messages");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(db_path: PathBuf) -> EngineConfig {
        EngineConfig {
            db_path,
            ..EngineConfig::from_env()
        }
    }

    #[test]
    fn test_ingest_reports_unusable_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let config = config_at(blocker.join("smartroom.db"));
        let message = r#"{"sensor":"light","value":14.0,"timestamp":"2025-03-01 10:00:00"}"#;
        let err = ingest(&config, vec![message.to_string()]).unwrap_err();
        assert!(err.to_string().contains("cannot create data directory"));
    }

    #[test]
    fn test_ingest_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path().join("nested").join("smartroom.db"));
        let message = r#"{"sensor":"light","value":14.0,"timestamp":"2025-03-01 10:00:00"}"#;

        ingest(&config, vec![message.to_string()]).unwrap();
        assert!(config.db_path.exists());
    }
}
