use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use etl_daily::{
    config::{load_env_file, EtlConfig},
    error::EtlError,
    etl::{
        extract::HttpSource,
        load::{read_table, DuckDbStore},
        run_etl_pipeline, RunOutcome,
    },
    schedule::{Scheduler, SystemClock},
    utils::lib_duckdb::open_connection,
};
use log::{error, info};
use tabled::{builder::Builder, settings::Style};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Run the pipeline once right away, then exit
    #[arg(long)]
    run_now: bool,

    /// Print the first N rows of the destination table, then exit
    #[arg(long, value_name = "N")]
    preview: Option<usize>,
}

fn run_once(config: &EtlConfig) -> RunOutcome {
    let source = match HttpSource::new(&config.source_url, config.http_timeout) {
        Ok(source) => source,
        Err(e) => {
            error!("Could not build the http client: {}", e);
            return RunOutcome::AbortedAtExtract;
        }
    };
    let store = DuckDbStore::new(&config.connection_string);
    run_etl_pipeline(&source, &store, &config.table_name)
}

/// Show what is currently in the destination table.
fn preview(config: &EtlConfig, n: usize) -> Result<(), Box<dyn Error>> {
    let conn = open_connection(&config.connection_string)?;
    let (names, rows) = read_table(&conn, &config.table_name, n)?;
    let mut builder = Builder::new();
    builder.push_record(names);
    for row in rows {
        builder.push_record(row.into_iter().map(|c| c.unwrap_or_else(|| "NULL".to_string())));
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    println!("Data loaded into the database:\n{}", table);
    Ok(())
}

/// Run the ETL pipeline every day at the configured time, until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    load_env_file(&args.env);
    let config = EtlConfig::from_env()?;

    if let Some(n) = args.preview {
        return preview(&config, n);
    }

    if args.run_now {
        let outcome = tokio::task::spawn_blocking(move || run_once(&config)).await?;
        info!("Run finished: {:?}", outcome);
        return Ok(());
    }

    let clock = SystemClock::new(config.timezone.as_deref())?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let mut handle = tokio::task::spawn_blocking(move || -> Result<(), EtlError> {
        let schedule_time = config.schedule_time.clone();
        let mut scheduler = Scheduler::new(clock);
        scheduler.every_day_at(&schedule_time, move || {
            run_once(&config);
        })?;
        info!("ETL pipeline scheduled to run daily at {}.", schedule_time);
        scheduler.run_forever(&flag);
        Ok(())
    });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Interrupt received, waiting for the scheduler to stop...");
            shutdown.store(true, Ordering::SeqCst);
            handle.await??;
        }
        res = &mut handle => {
            res??;
        }
    }

    Ok(())
}
