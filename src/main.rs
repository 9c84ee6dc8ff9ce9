use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, SimulateArgs};
use cli::simulate::{self, SimulationReport};
use quiesce::config::{Config, load_config};
use quiesce::queue::{ManualClock, SystemClock};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quiesce")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("quiesce.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Config => handle_config_command(config),
        Commands::Simulate(args) => handle_simulate_command(args, config, cli.is_verbose()),
    }
}

fn handle_config_command(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn handle_simulate_command(args: &SimulateArgs, config: &Config, verbose: bool) -> Result<()> {
    info!("Simulating: {:?}", args);
    let report = if args.real_time {
        simulate::run(args, config, Arc::new(SystemClock::new()))
    } else {
        simulate::run(args, config, Arc::new(ManualClock::new()))
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, verbose);
    }

    if let Some(error) = &report.error {
        eyre::bail!("Queue did not go idle: {}", error);
    }
    Ok(())
}

fn print_report(report: &SimulationReport, verbose: bool) {
    if report.idle {
        println!("{} after {} ms", "Idle".green().bold(), report.elapsed_ms);
    } else {
        println!("{} after {} ms", "Not idle".red().bold(), report.elapsed_ms);
    }
    println!("  Tasks run:   {}", report.tasks_run);
    println!("  Dispatched:  {}", report.dispatched);
    println!("  Pending:     {}", report.pending);
    if verbose {
        println!("  Generations: {}", report.generations);
        println!("  Uptime:      {} ms", report.simulated_ms);
    }
    if let Some(error) = &report.error {
        println!("  {} {}", "Error:".red(), error);
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
