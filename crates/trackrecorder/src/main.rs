//! `trakrec` - CLI for trackrecorder
//!
//! This binary provides the command-line interface for recording GPS tracks,
//! replaying per-day logs, and inspecting configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use trackrecorder::cli::{
    Cli, Command, ConfigCommand, ReportCommand, RunCommand, SessionsCommand, StatusCommand,
};
use trackrecorder::sources::{GpsdFixSource, SimulatedSource, SimulatedTrack};
use trackrecorder::summary::hms;
use trackrecorder::{
    init_logging, Config, FixSource, NoiseFilter, SessionReplay, SessionSummary, Tracker,
};

/// Cadence of the control tick driving log writes and summary commits.
const TICK_PERIOD: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    // Execute the command
    match cli.command {
        Command::Run(run_cmd) => handle_run(&config, &run_cmd).await,
        Command::Report(report_cmd) => handle_report(&config, &report_cmd),
        Command::Sessions(sessions_cmd) => handle_sessions(&config, &sessions_cmd),
        Command::Status(status_cmd) => handle_status(&config, &status_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_run(config: &Config, cmd: &RunCommand) -> anyhow::Result<()> {
    if cmd.simulate {
        info!("using simulated receiver");
        let source = Arc::new(SimulatedSource::new(SimulatedTrack::default()));
        run_loop(config, source, cmd).await
    } else {
        let source = Arc::new(
            GpsdFixSource::connect(&config.gps.address, config.read_timeout())
                .with_context(|| format!("connecting to gpsd at {}", config.gps.address))?,
        );
        run_loop(config, source, cmd).await
    }
}

async fn run_loop<S: FixSource + 'static>(
    config: &Config,
    source: Arc<S>,
    cmd: &RunCommand,
) -> anyhow::Result<()> {
    let mut tracker = Tracker::new(config, source);

    if !cmd.no_prime {
        let primed = tracker.prime_from_today(|_| {});
        if primed > 0 {
            info!(records = primed, "primed totals from today's log");
        }
    }

    tracker.acquire().context("starting acquisition")?;
    tracker.start_logging();

    let mut ticker = tokio::time::interval(TICK_PERIOD);
    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracker.tick();
                if tracker.sampler_failed() {
                    break Err(anyhow::anyhow!("receiver stream failed, see log"));
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for interrupt")?;
                info!("interrupt received, stopping");
                break Ok(());
            }
        }
    };

    tracker.stop_logging();
    tracker.release();
    tracker.shutdown();

    let summary = tracker.summary();
    if summary.records > 0 {
        print_totals(&summary, config.display.metric);
    }

    if let Err(err) = &outcome {
        error!(%err, "recording aborted");
    }
    outcome
}

fn print_totals(summary: &SessionSummary, metric: bool) {
    let (hours, minutes, seconds) = hms(summary.secs);
    println!("Records:   {}", summary.records);
    println!("Sessions:  {}", summary.sessions_recorded);
    println!("Distance:  {}", format_distance(summary, metric));
    println!("Moving:    {hours}:{minutes:02}:{seconds:02}");
    if let (Some(min), Some(max)) = (summary.min_height, summary.max_height) {
        println!("Altitude:  {min:.1} m to {max:.1} m");
    }
    if let Some(speed) = summary.average_speed_kmh() {
        if metric {
            println!("Average:   {speed:.2} km/h");
        } else {
            println!(
                "Average:   {:.2} mph",
                speed * trackrecorder::summary::KM_TO_MILES
            );
        }
    }
}

fn format_distance(summary: &SessionSummary, metric: bool) -> String {
    if metric {
        format!("{:.3} km", summary.km)
    } else {
        format!("{:.3} miles", summary.miles)
    }
}

fn day_summary(config: &Config, path: &Path) -> SessionSummary {
    let replay = SessionReplay::new(NoiseFilter::new(config.noise.divisor));
    let mut summary = SessionSummary::new();
    replay.load_into(path, &mut summary, |_| {});
    summary
}

fn handle_report(config: &Config, cmd: &ReportCommand) -> anyhow::Result<()> {
    let directory = config.log_directory();
    let files = trackrecorder::store::list_log_files(&directory, &config.log.prefix)
        .with_context(|| format!("listing logs in {}", directory.display()))?;

    if files.is_empty() {
        println!("No logs found in {}", directory.display());
        return Ok(());
    }

    println!("{:<12} {:>8} {:>10} {:>14} {:>10}", "Day", "Records", "Sessions", "Distance", "Moving");
    for path in &files {
        let day = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let day = day
            .strip_prefix(config.log.prefix.as_str())
            .unwrap_or(&day)
            .to_string();
        let summary = day_summary(config, path);
        let (hours, minutes, seconds) = hms(summary.secs);
        println!(
            "{:<12} {:>8} {:>10} {:>14} {hours:>6}:{minutes:02}:{seconds:02}",
            day,
            summary.records,
            summary.sessions_recorded,
            format_distance(&summary, config.display.metric),
        );

        if cmd.sessions {
            let replay = SessionReplay::new(NoiseFilter::new(config.noise.divisor));
            for (index, session) in replay.load(path, false).iter().enumerate() {
                print_session_row(index, session, config.display.metric);
            }
        }
    }
    Ok(())
}

fn print_session_row(index: usize, session: &SessionSummary, metric: bool) {
    let (hours, minutes, seconds) = hms(session.secs);
    println!(
        "  session {index}: {} records, {}, {hours}:{minutes:02}:{seconds:02}",
        session.records,
        format_distance(session, metric),
    );
}

fn handle_sessions(config: &Config, cmd: &SessionsCommand) -> anyhow::Result<()> {
    let replay = SessionReplay::new(NoiseFilter::new(config.noise.divisor));
    let sessions = replay.load(&cmd.file, cmd.filter_noise);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    for (index, session) in sessions.iter().enumerate() {
        let (hours, minutes, seconds) = hms(session.secs);
        println!("Session {index}");
        println!("  Records:   {}", session.records);
        println!("  Retained:  {}", session.points.len());
        println!("  Distance:  {}", format_distance(session, config.display.metric));
        println!("  Moving:    {hours}:{minutes:02}:{seconds:02}");
        if let (Some(min), Some(max)) = (session.min_height, session.max_height) {
            println!("  Altitude:  {min:.1} m to {max:.1} m");
        }
        if let Some(speed) = session.average_speed_kmh() {
            println!("  Average:   {speed:.2} km/h");
        }
        if let Some(bounds) = session.bounds() {
            println!(
                "  Bounds:    {:.5},{:.5} to {:.5},{:.5}",
                bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon
            );
        }
        println!();
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let path = config
        .log_directory()
        .join(trackrecorder::store::today_file_name(&config.log.prefix));
    let summary = day_summary(config, &path);

    if cmd.json {
        let status = serde_json::json!({
            "log_file": path,
            "exists": path.exists(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("trakrec status");
        println!("--------------");
        println!("Log file:  {}", path.display());
        if path.exists() {
            print_totals(&summary, config.display.metric);
        } else {
            println!("Nothing recorded today.");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Log]");
                println!("  Directory:     {}", config.log_directory().display());
                println!("  Prefix:        {}", config.log.prefix);
                println!("  Write period:  {} s", config.log.write_period_secs);
                println!();
                println!("[Gps]");
                println!("  Address:       {}", config.gps.address);
                println!("  Read timeout:  {} ms", config.gps.read_timeout_ms);
                println!();
                println!("[Noise]");
                println!("  Divisor:       {}", config.noise.divisor);
                println!();
                println!("[Display]");
                println!("  Metric:        {}", config.display.metric);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
