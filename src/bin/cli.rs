//! QuizPulse CLI
//!
//! Command-line interface for QuizPulse operations:
//! - Aggregate an exported event file offline
//! - Fetch raw events from a running server
//! - Check server status
//! - Seed a server with synthetic sessions
//! - Generate a default config file

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use quizpulse::analytics::{compute_advanced, compute_dashboard, AggregateOptions};
use quizpulse::events::{parse_range, preset, Event, StepCatalog, ZonePolicy};
use quizpulse::store::{Clock, FixedClock};
use quizpulse::tracker::{ClientInfo, SessionTracker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quizpulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quiz funnel analytics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8086", global = true)]
    pub api_url: String,

    /// Dashboard secret for the read endpoints
    #[arg(long, env = "QUIZPULSE_DASHBOARD_SECRET", global = true, hide_env_values = true)]
    pub secret: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate events from a JSON array or NDJSON file
    Report {
        /// Path to the event file
        path: PathBuf,
        /// Preset window (24h, 7d, 30d, 90d, all)
        #[arg(short, long, default_value = "all")]
        range: String,
        /// Start bound; epoch ms, RFC 3339, YYYY-MM-DD or now-7d
        #[arg(long)]
        start: Option<String>,
        /// End bound
        #[arg(long)]
        end: Option<String>,
        /// Minutes east of UTC for day and hour buckets
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset: i32,
    },

    /// Fetch raw events from the server
    Fetch {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show server status
    Status,

    /// Post synthetic quiz sessions to the server
    Seed {
        /// Number of sessions
        #[arg(short, long, default_value = "20")]
        sessions: usize,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Report {
            path,
            range,
            start,
            end,
            utc_offset,
        } => {
            let events = load_events(&path)?;
            let zone = ZonePolicy::from_offset_minutes(utc_offset)?;
            let now = Utc::now().timestamp_millis();

            let window = match parse_range(start.as_deref(), end.as_deref(), now, zone)? {
                Some(window) => window,
                None => preset(&range, now, zone)?,
            };
            let options = AggregateOptions {
                zone,
                ..Default::default()
            }
            .with_range(Some(window));

            let catalog = StepCatalog::reference();
            let snapshot = compute_dashboard(&events, &catalog, &options);
            let advanced = compute_advanced(&events, &catalog, &options);

            match cli.format.as_str() {
                "json" => {
                    let body = serde_json::json!({
                        "snapshot": snapshot,
                        "advanced": advanced,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                _ => print_report(&snapshot, &advanced),
            }
        }

        Commands::Fetch { start, end, output } => {
            let secret = cli
                .secret
                .context("A dashboard secret is required (--secret or QUIZPULSE_DASHBOARD_SECRET)")?;

            let mut query = Vec::new();
            if let Some(start) = start {
                query.push(("start", start));
            }
            if let Some(end) = end {
                query.push(("end", end));
            }

            let response = client
                .get(format!("{}/api/v1/events", cli.api_url))
                .bearer_auth(secret)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("Cannot connect to QuizPulse API at {}", cli.api_url))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                bail!("Fetch failed ({}): {}", status, text);
            }

            let body: serde_json::Value = response.json().await?;
            let events = body["events"].clone();

            let data = match cli.format.as_str() {
                "json" => serde_json::to_string_pretty(&events)?,
                _ => events
                    .as_array()
                    .map(|events| {
                        events
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default(),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &data)?;
                    println!(
                        "Fetched {} events to {:?} (source: {})",
                        body["totalEvents"].as_u64().unwrap_or(0),
                        path,
                        body["source"].as_str().unwrap_or("unknown")
                    );
                }
                None => println!("{}", data),
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let code = resp.status();
                    let health: serde_json::Value = resp.json().await?;

                    println!("QuizPulse v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!(
                        "API Status: {} ({})",
                        health["status"].as_str().unwrap_or("unknown"),
                        code
                    );

                    if let Some(backends) = health["backends"].as_array() {
                        println!();
                        println!("Backends:");
                        for backend in backends {
                            let events = backend["events"]
                                .as_u64()
                                .map(|n| n.to_string())
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "  {:<10} remote={:<5} events={}",
                                backend["name"].as_str().unwrap_or("-"),
                                backend["remote"].as_bool().unwrap_or(false),
                                events
                            );
                        }
                    }

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Err(e) => {
                    eprintln!("Cannot connect to QuizPulse API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin quizpulse");
                    std::process::exit(1);
                }
            }
        }

        Commands::Seed { sessions } => {
            let catalog = Arc::new(StepCatalog::reference());
            let clock = Arc::new(FixedClock::new(Utc::now().timestamp_millis()));

            let events: Vec<Event> = (0..sessions)
                .flat_map(|i| synthetic_session(i, Arc::clone(&catalog), Arc::clone(&clock)))
                .collect();

            let response = client
                .post(format!("{}/api/v1/events/batch", cli.api_url))
                .json(&serde_json::json!({ "events": events }))
                .send()
                .await
                .with_context(|| format!("Cannot connect to QuizPulse API at {}", cli.api_url))?;

            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            if !status.is_success() {
                bail!("Seed failed ({}): {}", status, body);
            }

            println!(
                "Seeded {} sessions: {} events accepted, {} rejected",
                sessions,
                body["accepted"].as_u64().unwrap_or(0),
                body["rejected"].as_u64().unwrap_or(0)
            );
        }

        Commands::Config { output } => {
            let config = quizpulse::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Read events from a JSON array or newline-delimited JSON
fn load_events(path: &Path) -> anyhow::Result<Vec<Event>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_events(&content).with_context(|| format!("Failed to parse events in {:?}", path))
}

fn parse_events(content: &str) -> anyhow::Result<Vec<Event>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))
        })
        .collect()
}

/// One scripted session. Every fourth session completes the quiz; the rest
/// stop at a step that varies with the index.
fn synthetic_session(index: usize, catalog: Arc<StepCatalog>, clock: Arc<FixedClock>) -> Vec<Event> {
    let terminal = catalog.terminal_step();
    let completes = index % 4 == 0;
    let last_step = if completes {
        terminal - 1
    } else {
        1 + (index as u32 * 7) % (terminal - 1)
    };

    let source: Arc<dyn Clock> = clock.clone();
    let mut tracker = SessionTracker::new(catalog, source);
    let client = ClientInfo {
        user_agent: "quizpulse-seed".to_string(),
        referrer: String::new(),
        screen_width: if index % 3 == 0 { 1440 } else { 390 },
        screen_height: if index % 3 == 0 { 900 } else { 844 },
        url: "/quiz".to_string(),
    };

    let mut events = vec![tracker.track_start(&client)];
    for step in 1..=last_step {
        clock.advance(2_000 + (index as i64 % 5) * 750);
        events.push(tracker.track_step_view(step));
        clock.advance(1_500);
        events.push(tracker.track_answer(step, format!("option {}", index % 3), (index % 3) as i64));
        events.push(tracker.track_step_complete(step));
    }

    clock.advance(1_000);
    if completes {
        events.push(tracker.track_complete(None));
    } else {
        events.push(tracker.track_abandon(last_step));
    }

    clock.advance(60_000);
    events
}

fn print_report(
    snapshot: &quizpulse::analytics::DashboardSnapshot,
    advanced: &quizpulse::analytics::AdvancedMetrics,
) {
    println!("Sessions:        {}", snapshot.total_sessions);
    println!("  completed:     {}", snapshot.completed_sessions);
    println!("  abandoned:     {}", snapshot.abandoned_sessions);
    println!("  in progress:   {}", snapshot.in_progress_sessions);
    println!("Completion rate: {:.1}%", snapshot.completion_rate);
    println!("Avg completion:  {:.1}s", snapshot.avg_completion_time);
    println!("Events:          {}", snapshot.total_events);
    println!("Engagement:      {}/100", advanced.engagement_score);
    println!(
        "Devices:         {} mobile, {} desktop, {} unknown",
        advanced.device_breakdown.mobile,
        advanced.device_breakdown.desktop,
        advanced.device_breakdown.unknown
    );
    println!();

    if snapshot.total_sessions == 0 {
        println!("No sessions in the selected range");
        return;
    }

    println!(
        "{:<4} {:<28} {:>7} {:>8} {:>8}",
        "Step", "Name", "Users", "Dropoff", "Rate"
    );
    println!("{}", "-".repeat(60));
    for stage in &snapshot.funnel {
        println!(
            "{:<4} {:<28} {:>7} {:>8} {:>7.1}%",
            stage.step,
            truncate(&stage.name, 28),
            stage.users,
            stage.dropoff,
            stage.dropoff_rate
        );
    }

    if !advanced.dropoff_points.is_empty() {
        println!();
        println!("Top drop-off points:");
        for point in advanced.dropoff_points.iter().take(5) {
            println!("  step {:<3} {:<28} {}", point.step, point.step_name, point.sessions);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
