use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use oreka_api::{
    config,
    services::{
        csv_import::parse_csv,
        kpi::{kpi_pos_only, price_index, PosKpis},
        pos_records::{load_price_list_file, pos_lines_from_rows},
        reports::{build_financial_report, FinancialReport, KpiInputs},
    },
};
use serde::Serialize;
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_tracing(&cli.log_level, false);

    match cli.command {
        Commands::Pos(args) => handle_pos_command(args, cli.json)?,
        Commands::Report(args) => handle_report_command(args, cli.json)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "oreka", about = "Compute restaurant KPIs from local files", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(long, global = true, default_value = "warn", help = "Log level for diagnostics on stderr")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// POS KPIs from a point-of-sale CSV export
    Pos(PosArgs),
    /// Full financial report from a JSON dataset
    Report(ReportArgs),
}

#[derive(Args)]
struct PosArgs {
    #[arg(help = "POS export in CSV format")]
    file: PathBuf,
    #[arg(long, help = "Price list (.csv or .json) used for the discount rate")]
    price_list: Option<PathBuf>,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(help = "JSON file with pos_lines, purchase_invoices, labor_costs, ...")]
    inputs: PathBuf,
}

#[derive(Serialize)]
struct PosOutput {
    #[serde(flatten)]
    kpis: PosKpis,
    skipped_rows: usize,
}

fn handle_pos_command(args: PosArgs, json: bool) -> Result<()> {
    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let parsed = parse_csv(&bytes).context("failed to parse POS export")?;
    let conversion = pos_lines_from_rows(&parsed.rows);
    debug!(
        lines = conversion.records.len(),
        skipped = conversion.skipped,
        "converted POS rows"
    );

    let prices = args
        .price_list
        .as_deref()
        .map(|path| {
            load_price_list_file(path)
                .with_context(|| format!("failed to load price list {}", path.display()))
        })
        .transpose()?
        .map(|items| price_index(&items));

    let output = PosOutput {
        kpis: kpi_pos_only(&conversion.records, prices.as_ref())
            .context("failed to compute POS KPIs")?,
        skipped_rows: conversion.skipped,
    };

    if json {
        print_json(&output)?;
    } else {
        render_pos(&output);
    }
    Ok(())
}

fn handle_report_command(args: ReportArgs, json: bool) -> Result<()> {
    let raw = fs::read_to_string(&args.inputs)
        .with_context(|| format!("failed to read {}", args.inputs.display()))?;
    let inputs: KpiInputs =
        serde_json::from_str(&raw).context("inputs file is not a valid KPI dataset")?;
    let report = build_financial_report(&inputs).context("failed to build financial report")?;

    if json {
        print_json(&report)?;
    } else {
        render_report(&report);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_pos(output: &PosOutput) {
    let kpis = &output.kpis;
    println!("Revenue: {}", kpis.revenue_total);
    for (area, amount) in &kpis.revenue_by_area {
        println!("- {} {}", area, amount);
    }
    for (method, amount) in &kpis.revenue_by_payment {
        println!("- {} {}", method, amount);
    }
    println!(
        "Receipts: {} • average {}",
        kpis.receipt_count, kpis.average_receipt
    );
    match kpis.discount_rate {
        Some(rate) => println!("Discount rate: {}", rate),
        None => println!("Discount rate: n/a"),
    }
    if output.skipped_rows > 0 {
        println!("Skipped rows: {}", output.skipped_rows);
    }
}

fn optional(value: Option<rust_decimal::Decimal>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

fn render_report(report: &FinancialReport) {
    println!("Period: {} days", report.period_days);
    println!("Revenue: {}", report.revenue_total);
    println!("COGS: {}", report.cogs_total);
    for (area, margin) in &report.gross_margin_by_area {
        println!("- {} gross margin {}", area, margin);
    }
    println!("Gross margin: {}", report.gross_margin_total);
    println!(
        "Labor {} • fixed {} • other {}",
        report.labor_total, report.fixed_total, report.other_costs
    );
    println!("Operating margin: {}", report.operating_margin_total);
    println!("ROI (monthly): {}", optional(report.roi_monthly));
    println!("Inventory turnover: {}", optional(report.inventory_turnover));
    println!(
        "Inventory coverage (days): {}",
        optional(report.inventory_coverage_days)
    );
}
