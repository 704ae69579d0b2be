use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use colored::*;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use signon_mock_core::{BrokerConfig, BrokerFixture, Variant};

use crate::scenario::{RunReport, Scenario};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Call")]
    member: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Identity")]
    identity: u32,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Mechanism")]
    mechanism: String,
    #[tabled(rename = "Data")]
    data: String,
    #[tabled(rename = "Calls")]
    process_count: u32,
}

pub async fn execute(args: RunArgs, config: BrokerConfig) -> Result<()> {
    let scenario = Scenario::from_file(&args.scenario)?;
    let fixture = BrokerFixture::with_config(config)?;
    info!(scenario = %args.scenario.display(), steps = scenario.steps.len(), "Running scenario");

    let report = scenario.run(fixture.broker()).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    if !report.passed() {
        bail!(
            "Scenario failed: {} step(s) failed{}",
            report.failed_steps(),
            if report.session_mismatch.is_some() {
                ", session expectations not met"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if let Some(name) = &report.name {
        println!("{} {}", "Scenario:".bold(), name.cyan());
    }

    let steps: Vec<StepRow> = report
        .steps
        .iter()
        .map(|s| StepRow {
            index: s.index,
            member: s.member.clone(),
            path: s.path.clone(),
            result: s
                .reply
                .clone()
                .or_else(|| s.error.clone())
                .unwrap_or_default(),
            status: if s.passed {
                "ok".green().to_string()
            } else {
                "FAIL".red().bold().to_string()
            },
        })
        .collect();
    println!("{}", Table::new(steps).with(Style::modern()));

    if report.sessions.is_empty() {
        println!("{}", "No sessions opened.".yellow());
    } else {
        let sessions: Vec<SessionRow> = report
            .sessions
            .iter()
            .map(|s| SessionRow {
                path: s.path.to_string(),
                identity: s.identity,
                method: s.method.clone(),
                mechanism: s.mechanism.clone().unwrap_or_else(|| "-".to_string()),
                data: s
                    .received_data
                    .clone()
                    .map(|d| Variant::Map(d).to_string())
                    .unwrap_or_else(|| "-".to_string()),
                process_count: s.process_count,
            })
            .collect();
        println!("{}", Table::new(sessions).with(Style::modern()));
    }

    if let Some(mismatch) = &report.session_mismatch {
        println!("{} {}", "Session mismatch:".red().bold(), mismatch);
    }

    if report.passed() {
        println!(
            "{} {} step(s), {} session(s)",
            "✓ Scenario passed:".green().bold(),
            report.steps.len(),
            report.sessions.len()
        );
    }
}
