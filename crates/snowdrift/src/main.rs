//! Snowdrift CLI: load one month of source data into the warehouse.

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::info;

use snowdrift::app::{AppContext, LoadArgs, one_line};
use snowdrift::{LoadOutcome, Prepared, init_tracing, resolve};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match LoadArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let period = match resolve(&args.execution_date) {
        Ok(period) => period,
        Err(e) => {
            eprintln!("snowdrift: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match AppContext::from_args(&args.common) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("snowdrift: {}", one_line(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = ctx.init_metrics() {
        eprintln!("snowdrift: {e}");
        return ExitCode::FAILURE;
    }

    let loader = match ctx.loader().await {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("snowdrift: {}", one_line(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    info!(period = %period, dry_run = args.dry_run, "Starting snowdrift");

    if args.dry_run {
        let prepared = loader.prepare(period).await;
        ctx.export_metrics();

        return match prepared {
            Ok(Prepared::Ready { file, records }) => {
                println!(
                    "snowdrift {period}: dry run, {file} has {} rows for {}.{}",
                    records.rows(),
                    ctx.config.sink.schema,
                    ctx.config.sink.table
                );
                ExitCode::SUCCESS
            }
            Ok(Prepared::Skipped(reason)) => {
                println!("snowdrift {period}: dry run, skipped: {reason}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("snowdrift {period}: {}", one_line(&e.to_string()));
                ExitCode::FAILURE
            }
        };
    }

    let outcome = loader.run(period).await;
    ctx.export_metrics();

    match outcome {
        LoadOutcome::Failed(e) => {
            eprintln!("snowdrift {period}: {}", one_line(&e.to_string()));
            ExitCode::FAILURE
        }
        outcome => {
            println!("snowdrift {period}: {outcome}");
            ExitCode::SUCCESS
        }
    }
}
