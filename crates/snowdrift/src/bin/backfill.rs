//! Snowdrift back-fill CLI: load every month in a range.

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use clap::error::ErrorKind;

use snowdrift::app::{AppContext, BackfillArgs, one_line};
use snowdrift::{Backfill, RunPeriod, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match BackfillArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let end = args
        .to
        .unwrap_or_else(|| RunPeriod::from_date(Utc::now().date_naive()));

    let ctx = match AppContext::from_args(&args.common) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("snowdrift-backfill: {}", one_line(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = ctx.init_metrics() {
        eprintln!("snowdrift-backfill: {e}");
        return ExitCode::FAILURE;
    }

    let loader = match ctx.loader().await {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("snowdrift-backfill: {}", one_line(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    let summary = match Backfill::new(loader, args.retry_policy())
        .run(args.from, end)
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("snowdrift-backfill: {e}");
            return ExitCode::FAILURE;
        }
    };
    ctx.export_metrics();

    for failed in &summary.failed {
        eprintln!(
            "snowdrift-backfill {}: failed after {} attempt(s): {}",
            failed.period,
            failed.attempts,
            one_line(&failed.message)
        );
    }
    println!(
        "snowdrift-backfill {}..{}: {} loaded ({} rows), {} skipped, {} failed",
        args.from,
        end,
        summary.loaded,
        summary.rows,
        summary.skipped,
        summary.failed.len()
    );

    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
