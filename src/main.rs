use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use cutwatch::analysis::compute_kpis;
use cutwatch::analysis::report::render_report;
use cutwatch::analysis::stats::{state_summary, SUMMARY_WINDOW_HOURS};
use cutwatch::config::{ConfigStore, CONFIG_ENV, MAX_RETENTION_DAYS};
use cutwatch::detect::anomaly::scan_anomalies;
use cutwatch::detect::engine::DetectionEngine;
use cutwatch::detect::events::{EventLog, NewManualStop};
use cutwatch::detect::{alert_level, ClassificationRequest, DowntimeEvent, StopType, Urgency};
use cutwatch::storage::retention::purge_older_than;
use cutwatch::storage::{self, SampleStore};
use cutwatch::telemetry::generator::DemoGenerator;
use cutwatch::telemetry::Sample;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "cutwatch",
    about = "Predictive-maintenance monitoring for an industrial cutting machine",
    version,
    long_about = None
)]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "CUTWATCH_DB", default_value = "data/cutwatch.db")]
    db: PathBuf,

    /// Configuration file path
    #[arg(long, global = true, env = CONFIG_ENV, default_value = "cutwatch.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + background detection)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Store a synthetic demo trace (one sample per minute)
    Generate {
        /// Hours of data to generate
        #[arg(long, default_value = "24")]
        hours: u32,

        /// RNG seed for a reproducible trace
        #[arg(long)]
        seed: Option<u64>,

        /// First timestamp (defaults to `hours` before now)
        #[arg(long)]
        start: Option<String>,

        /// Inject a vibration spike for anomaly demos
        #[arg(long)]
        spike: bool,
    },

    /// Import samples from a JSON array
    Import {
        /// Input file
        input: PathBuf,
    },

    /// Export samples as a JSON array
    Export {
        /// Output file
        #[arg(long, default_value = "samples.json")]
        output: PathBuf,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Run stop detection once over all stored samples
    Detect {
        #[arg(long)]
        json: bool,
    },

    /// List automatic stops waiting for a cause
    Unclassified {
        #[arg(long)]
        json: bool,
    },

    /// Assign a cause to an automatic stop
    Classify {
        /// Automatic stop id
        id: Uuid,

        /// maintenance, planned, unplanned, operator or quality
        #[arg(long = "type")]
        stop_type: StopType,

        #[arg(long)]
        subcategory: String,

        #[arg(long)]
        operator: String,

        #[arg(long, default_value = "")]
        comment: String,

        #[arg(long, default_value = "medium")]
        urgency: Urgency,
    },

    /// Log a manual downtime entry
    LogStop {
        #[arg(long = "type")]
        stop_type: StopType,

        #[arg(long)]
        subcategory: String,

        /// Duration in minutes
        #[arg(long)]
        duration: u32,

        #[arg(long)]
        operator: String,

        /// Component concerned
        #[arg(long)]
        part: Option<String>,

        #[arg(long, default_value = "")]
        comment: String,

        #[arg(long, default_value = "medium")]
        urgency: Urgency,

        /// When the stop happened (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the merged downtime timeline
    Stops {
        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Compute reliability KPIs
    Kpis {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Scan vibration for statistical anomalies
    Anomalies {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Sigma multiplier (defaults to the configured value)
        #[arg(long)]
        multiplier: Option<f64>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show the latest reading and store summary
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Print the maintenance report
    Report {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Drop samples and events older than the retention period
    Cleanup {
        /// Override the configured retention in days
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RETENTION_DAYS)))]
        days: Option<u32>,
    },

    /// Read or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one key
    Get { key: String },

    /// Validate and persist one key
    Set { key: String, value: String },

    /// Print all keys
    List,
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (UTC) or a bare date. A bare
/// date used as an end bound covers the whole day.
fn parse_time(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(t.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("unrecognised date '{}'", raw))?;
    let t = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    t.map(|t| t.and_utc())
        .with_context(|| format!("unrecognised date '{}'", raw))
}

fn parse_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = start.map(|s| parse_time(s, false)).transpose()?;
    let end = end.map(|s| parse_time(s, true)).transpose()?;
    Ok((start, end))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting cutwatch daemon");
            cutwatch::serve(&bind, &cli.db, &cli.config).await?;
        }
        Commands::Generate {
            hours,
            seed,
            start,
            spike,
        } => {
            let start = match start {
                Some(raw) => parse_time(&raw, false)?,
                None => Utc::now() - Duration::hours(i64::from(hours)),
            };
            let mut generator = DemoGenerator::new(seed);
            let mut samples = generator.generate(start, hours);
            if spike {
                if let Some(range) = generator.inject_spike(&mut samples) {
                    println!("Injected vibration spike at samples {}..{}", range.start, range.end);
                }
            }
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let report = store.insert(&samples)?;
            println!(
                "Generated {} samples ({} stored, {} already present).",
                samples.len(),
                report.inserted,
                report.skipped
            );
        }
        Commands::Import { input } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let samples: Vec<Sample> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse samples from {}", input.display()))?;
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let report = store.insert(&samples)?;
            println!(
                "Imported {} samples ({} skipped as duplicates).",
                report.inserted, report.skipped
            );
        }
        Commands::Export { output, start, end } => {
            let (start, end) = parse_window(start.as_deref(), end.as_deref())?;
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let samples = store.load(start, end)?;
            let file = std::fs::File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &samples)?;
            println!("Exported {} samples to {}.", samples.len(), output.display());
        }
        Commands::Detect { json } => {
            let config = ConfigStore::open(&cli.config);
            let engine = DetectionEngine::new(storage::open_pool(&cli.db)?);
            let run = engine.run_once(config.config(), Utc::now())?;
            if json {
                print_json(&run)?;
            } else {
                println!(
                    "Scanned {} samples: {} stops found, {} new.",
                    run.scanned, run.candidates, run.accepted
                );
            }
        }
        Commands::Unclassified { json } => {
            let log = EventLog::new(storage::open_pool(&cli.db)?);
            let pending = log.unclassified_events()?;
            if json {
                print_json(&pending)?;
            } else if pending.is_empty() {
                println!("No stops waiting for classification.");
            } else {
                println!("{:<36} | {:<16} | {:<16} | Minutes", "Id", "Start", "End");
                println!("{:-<36}-|-{:-<16}-|-{:-<16}-|-{:-<7}", "", "", "", "");
                for stop in pending {
                    println!(
                        "{:<36} | {:<16} | {:<16} | {:.1}",
                        stop.id,
                        stop.start.format("%Y-%m-%d %H:%M"),
                        stop.end.format("%Y-%m-%d %H:%M"),
                        stop.duration_minutes
                    );
                }
            }
        }
        Commands::Classify {
            id,
            stop_type,
            subcategory,
            operator,
            comment,
            urgency,
        } => {
            let log = EventLog::new(storage::open_pool(&cli.db)?);
            let request = ClassificationRequest {
                stop_type,
                subcategory,
                comment,
                operator,
                urgency,
            };
            let stop = log.classify_event(id, request, Utc::now())?;
            println!("Stop {} classified as {}.", stop.id, stop_type.label());
        }
        Commands::LogStop {
            stop_type,
            subcategory,
            duration,
            operator,
            part,
            comment,
            urgency,
            at,
        } => {
            let timestamp = match at {
                Some(raw) => parse_time(&raw, false)?,
                None => Utc::now(),
            };
            let log = EventLog::new(storage::open_pool(&cli.db)?);
            let stored = log.add_manual_stop(NewManualStop {
                timestamp,
                stop_type,
                subcategory,
                part,
                duration_minutes: duration,
                comment,
                operator,
                urgency,
            })?;
            println!("Manual stop {} logged.", stored.id);
        }
        Commands::Stops { limit, json } => {
            let log = EventLog::new(storage::open_pool(&cli.db)?);
            let timeline = log.timeline(Some(limit))?;
            if json {
                print_json(&timeline)?;
            } else if timeline.is_empty() {
                println!("No downtime recorded.");
            } else {
                println!("{:<16} | {:<9} | {:<16} | {:>7} | Cause", "When", "Source", "Type", "Minutes");
                println!("{:-<16}-|-{:-<9}-|-{:-<16}-|-{:-<7}-|-{:-<20}", "", "", "", "", "");
                for event in timeline {
                    let when = event.at().format("%Y-%m-%d %H:%M");
                    match event {
                        DowntimeEvent::Automatic(stop) => {
                            let (kind, cause) = match &stop.classification {
                                Some(c) => (c.stop_type.label(), c.subcategory.as_str()),
                                None => ("unclassified", ""),
                            };
                            println!(
                                "{:<16} | {:<9} | {:<16} | {:>7.1} | {}",
                                when, "automatic", kind, stop.duration_minutes, cause
                            );
                        }
                        DowntimeEvent::Manual(stop) => {
                            println!(
                                "{:<16} | {:<9} | {:<16} | {:>7} | {}",
                                when,
                                "manual",
                                stop.stop_type.label(),
                                stop.duration_minutes,
                                stop.subcategory
                            );
                        }
                    }
                }
            }
        }
        Commands::Kpis { start, end, json } => {
            let (start, end) = parse_window(start.as_deref(), end.as_deref())?;
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let kpis = compute_kpis(&store.load(start, end)?, None, None);
            if json {
                print_json(&kpis)?;
            } else if kpis.is_empty() {
                println!("No samples in the selected period.");
            } else {
                for (kpi, value) in &kpis {
                    println!("{:<20} {:>7.1} {}", kpi.as_str(), value, kpi.unit());
                }
            }
        }
        Commands::Anomalies {
            start,
            end,
            multiplier,
            limit,
            json,
        } => {
            let (start, end) = parse_window(start.as_deref(), end.as_deref())?;
            let config = ConfigStore::open(&cli.config);
            let multiplier = multiplier.unwrap_or(config.config().anomaly_multiplier);
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let found = scan_anomalies(&store.load(start, end)?, multiplier);
            if json {
                print_json(&found)?;
            } else {
                println!("{} anomalies (multiplier {}).", found.len(), multiplier);
                for a in found.iter().take(limit) {
                    println!(
                        "{} | {:<11} | {:>6.2} mm/s | threshold {:.2} | {:?}",
                        a.timestamp.format("%Y-%m-%d %H:%M"),
                        a.axis.as_str(),
                        a.value,
                        a.threshold,
                        a.severity
                    );
                }
            }
        }
        Commands::Status { json } => {
            let config = ConfigStore::open(&cli.config);
            let pool = storage::open_pool(&cli.db)?;
            let store = SampleStore::new(pool.clone());
            let log = EventLog::new(pool);
            let latest = store.latest()?;
            let alert = latest.as_ref().map(|s| alert_level(s, config.config()));
            let pending = log.unclassified_events()?.len();
            let count = store.count()?;
            let states = state_summary(&store.recent(SUMMARY_WINDOW_HOURS)?);

            if json {
                print_json(&serde_json::json!({
                    "latest": latest,
                    "alert_level": alert,
                    "sample_count": count,
                    "unclassified_stops": pending,
                    "state_summary": states,
                }))?;
            } else {
                println!("Samples stored:      {}", count);
                match (&latest, alert) {
                    (Some(s), Some(level)) => {
                        println!("Latest reading:      {}", s.timestamp.format("%Y-%m-%d %H:%M:%S"));
                        println!("Machine state:       {}", s.state.label());
                        println!(
                            "Vibration (x/y/z):   {:.2} / {:.2} / {:.2} mm/s",
                            s.vibration_x, s.vibration_y, s.vibration_z
                        );
                        println!("Alert level:         {:?}", level);
                    }
                    _ => println!("Latest reading:      none"),
                }
                println!("Unclassified stops:  {}", pending);
                if !states.is_empty() {
                    println!();
                    println!("Last {} hours by state:", SUMMARY_WINDOW_HOURS);
                    for share in &states {
                        println!(
                            "  {:<16} {:>5.1}%  {:>6.1} h",
                            share.state.label(),
                            share.percentage,
                            share.duration_hours
                        );
                    }
                }
            }
        }
        Commands::Report { start, end, output } => {
            let (start, end) = parse_window(start.as_deref(), end.as_deref())?;
            let config = ConfigStore::open(&cli.config);
            let store = SampleStore::new(storage::open_pool(&cli.db)?);
            let text = render_report(
                &store.load(None, None)?,
                start,
                end,
                config.config().anomaly_multiplier,
                Utc::now(),
            );
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{}", text),
            }
        }
        Commands::Cleanup { days } => {
            let config = ConfigStore::open(&cli.config);
            let days = days.unwrap_or(config.config().retention_days);
            let pool = storage::open_pool(&cli.db)?;
            let report = purge_older_than(&pool, days, Utc::now())?;
            println!(
                "Removed {} samples, {} manual stops and {} automatic stops older than {} days.",
                report.samples, report.manual_stops, report.auto_stops, days
            );
        }
        Commands::Config { action } => {
            let mut store = ConfigStore::open(&cli.config);
            match action {
                ConfigAction::Get { key } => {
                    println!("{}", store.get(&key)?);
                }
                ConfigAction::Set { key, value } => {
                    let value = store.set(&key, &value)?;
                    println!("{} = {}", key, value);
                }
                ConfigAction::List => {
                    for (key, value) in store.entries() {
                        println!("{:<30} = {}", key.as_str(), value);
                    }
                }
            }
        }
    }

    Ok(())
}
