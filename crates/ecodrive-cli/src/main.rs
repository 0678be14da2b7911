//! EcoDrive command line
//!
//! Lists adapters, records trips from a live ELM327 link, manages stored
//! trips and classifies the driver from their history.
//!
//! Usage: cargo run -p ecodrive-cli -- <COMMAND> [OPTIONS]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ecodrive_core::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "ecodrive")]
#[command(about = "OBD-II driving efficiency monitor", version = ecodrive_core::VERSION)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Trip store file (defaults to the user data directory)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports that may host an adapter
    Ports,

    /// Connect to an adapter and record a trip until Ctrl-C
    Drive {
        /// Serial port name
        #[arg(short, long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// host:port of a Wi-Fi adapter
        #[arg(short, long)]
        tcp: Option<String>,

        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,

        /// Do not save the trip
        #[arg(long)]
        no_save: bool,
    },

    /// Manage stored trips
    Trips {
        #[command(subcommand)]
        action: TripsAction,
    },

    /// Classify the driver from recent trips
    Classify {
        /// Network weights (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Feature scaler (JSON)
        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Number of recent trips to use
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum TripsAction {
    /// Show recent trips, newest first
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Delete a trip by id
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => EcoDriveConfig::default_path()?,
    };

    match cli.command {
        Command::Ports => list_adapters(),
        Command::Drive {
            port,
            baud,
            tcp,
            json,
            no_save,
        } => {
            let mut config = EcoDriveConfig::load_or_default(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            if port.is_some() {
                config.connection.port_name = port;
            }
            if let Some(baud) = baud {
                config.connection.baud_rate = baud;
            }
            if tcp.is_some() {
                config.connection.tcp_address = tcp;
            }
            let store = if no_save {
                None
            } else {
                Some(open_store(cli.store.as_deref(), &config)?)
            };
            drive(config, store, json).await
        }
        Command::Trips { action } => {
            let config = EcoDriveConfig::load_or_default(&config_path)?;
            let mut store = open_store(cli.store.as_deref(), &config)?;
            match action {
                TripsAction::List { limit } => list_trips(&store, limit),
                TripsAction::Delete { id } => {
                    store.delete(id)?;
                    println!("Deleted {id}");
                    Ok(())
                }
            }
        }
        Command::Classify {
            model,
            scaler,
            limit,
        } => {
            let config = EcoDriveConfig::load_or_default(&config_path)?;
            let store = open_store(cli.store.as_deref(), &config)?;
            classify(&store, model.as_deref(), scaler.as_deref(), limit)
        }
        Command::Config {
            action: ConfigAction::Init { force },
        } => {
            if config_path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", config_path.display());
            }
            EcoDriveConfig::default().save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

fn open_store(path: Option<&Path>, config: &EcoDriveConfig) -> Result<JsonTripStore> {
    let store = JsonTripStore::open(path)?
        .with_scorer(EfficiencyScorer::new(config.scoring.clone()));
    Ok(store)
}

fn list_adapters() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let kind = if port.bluetooth { "bluetooth" } else { "serial" };
        match &port.product {
            Some(product) => println!("{:<20} {:<10} {}", port.name, kind, product),
            None => println!("{:<20} {}", port.name, kind),
        }
    }
    Ok(())
}

async fn drive(config: EcoDriveConfig, mut store: Option<JsonTripStore>, json: bool) -> Result<()> {
    let scorer = EfficiencyScorer::new(config.scoring.clone());
    let mut session = Session::new(config);

    let adapter = session
        .connect_configured()
        .await
        .context("could not connect to the adapter")?;
    println!("Connected to {adapter}. Press Ctrl-C to end the trip.");

    let mut snapshots = session.start().await?;
    let mut state = session.state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("ending trip");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    warn!("adapter disconnected");
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot, json)?;
            }
        }
    }

    let Some(summary) = session.disconnect().await else {
        bail!("no trip data was recorded");
    };
    print_summary(&summary, &scorer);

    if let Some(store) = store.as_mut() {
        let id = store.save(summary)?;
        println!("Saved trip {id} to {}", store.path().display());
    }
    Ok(())
}

fn print_snapshot(snapshot: &TelemetrySnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }
    let fixed = |r: &Reading<f64>, digits: usize| match r.value() {
        Some(v) if v.is_finite() => format!("{v:.digits$}"),
        Some(_) => "-".to_string(),
        None => r.to_string(),
    };
    println!(
        "#{:<5} rpm {:>5}  {:>5} km/h  gear {}  coolant {} C  {} L/h  {} L/100km (avg {})  {} km",
        snapshot.cycle,
        snapshot.rpm,
        fixed(&snapshot.speed_kmh, 0),
        snapshot.gear,
        snapshot.coolant_c,
        fixed(&snapshot.instant_fuel_rate, 2),
        fixed(&snapshot.instant_consumption, 1),
        fixed(&snapshot.avg_consumption, 1),
        fixed(&snapshot.distance_km, 2),
    );
    Ok(())
}

fn print_summary(summary: &TripSummary, scorer: &EfficiencyScorer) {
    let score = summary.score();
    println!();
    println!("=== Trip Summary ===");
    println!("Duration:         {}", summary.duration_hms());
    println!("Distance:         {:.2} km", summary.distance_km);
    println!("Fuel used:        {:.2} L", summary.fuel_used_l);
    println!("Avg consumption:  {:.1} L/100km", summary.avg_fuel_consumption);
    println!("Avg speed:        {:.1} km/h", summary.avg_speed_kmh);
    println!("Max / avg RPM:    {} / {:.0}", summary.max_rpm, summary.avg_rpm);
    println!("Efficiency score: {} ({})", score, ScoreGrade::from_score(score));
    println!();
    println!("{}", scorer.feedback(summary));
}

fn list_trips(store: &JsonTripStore, limit: usize) -> Result<()> {
    let trips = store.list(limit)?;
    if trips.is_empty() {
        println!("No trips recorded");
        return Ok(());
    }
    for trip in trips {
        let s = &trip.summary;
        println!(
            "{}  {}  {}  {:>7.2} km  {:>5.1} L/100km  score {:>3}",
            trip.id,
            trip.recorded_at.format("%Y-%m-%d %H:%M"),
            s.duration_hms(),
            s.distance_km,
            s.avg_fuel_consumption,
            s.score()
        );
    }
    Ok(())
}

fn classify(
    store: &JsonTripStore,
    model: Option<&Path>,
    scaler: Option<&Path>,
    limit: usize,
) -> Result<()> {
    let trips: Vec<TripSummary> = store.list(limit)?.into_iter().map(|t| t.summary).collect();

    let profile = if model.is_some() {
        MlClassifier::load(model, scaler).profile(&trips)
    } else {
        RuleClassifier::new().profile(&trips)
    };

    println!("{}", profile.label);
    println!("{}", profile.description);
    if !profile.feedback.is_empty() {
        println!();
        println!("{}", profile.feedback);
    }
    match profile.classification.basis {
        ClassificationBasis::InsufficientData => {
            println!();
            println!(
                "Only {} trip(s) recorded; at least {} are needed for a reliable result.",
                trips.len(),
                ecodrive_core::classify::MIN_TRIPS
            );
        }
        ClassificationBasis::RulesFallback => {
            warn!("model unavailable, result is rule-based");
        }
        ClassificationBasis::RuleBased | ClassificationBasis::Model => {}
    }
    Ok(())
}
