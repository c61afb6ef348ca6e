mod advisory;
mod agents;
mod cli;
mod config;
mod ecosystems;
mod error;
mod model;
mod providers;
mod registry;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use colored::Colorize;
use model::RunReport;
use serde_json::json;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => execute(&args),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn execute(args: &RunArgs) -> anyhow::Result<()> {
    let config = config::load(args.config.as_deref(), args.overrides())?;
    let report = workflow::execute_run(&config, args.report_path.as_deref())?;

    print_summary(&report);
    let summary = json!({
        "dependencies_scanned": report.scanned_dependencies.len(),
        "updates_applied": report.updates_applied.len(),
        "vulnerabilities_found": report.vulnerabilities_count(),
        "provider_pr_url": report.provider_pr_url,
        "pr_workflow_triggered": report.pr_workflow_triggered,
    });
    println!("{summary}");
    Ok(())
}

fn print_summary(report: &RunReport) {
    eprintln!("\n{}", "DepDetective run summary".cyan().bold());
    eprintln!(
        "  {} dependencies scanned, {} known vulnerabilities",
        report.scanned_dependencies.len().to_string().white().bold(),
        report.vulnerabilities_count().to_string().yellow()
    );

    if report.updates_applied.is_empty() {
        eprintln!("  {}", "No updates were applied".yellow());
    } else {
        eprintln!("\n{}:", "Updates".cyan().bold());
        for change in &report.updates_applied {
            eprintln!(
                "  • {} {} → {} ({})",
                change.dependency.white().bold(),
                change.old_spec.red(),
                change.new_spec.green().bold(),
                change.file_path.dimmed()
            );
        }
    }

    match (&report.provider_pr_url, report.pr_workflow_triggered) {
        (Some(url), _) => eprintln!("\n{} {}", "✓ Pull request:".green(), url.bright_cyan()),
        (None, true) => eprintln!("\n{}", "✓ Pull request workflow triggered".green()),
        (None, false) => {}
    }
}
