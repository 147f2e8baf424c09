//! geoproof-ctl
//!
//! Inspects and maintains a device's persisted attendance state: the armed
//! event, the offline queue, and the debounce marker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use geoproof::debounce::Debouncer;
use geoproof::sync::http::{HttpLedger, LedgerConfig};
use geoproof::telemetry::init_tracing;
use geoproof::time::to_iso;
use geoproof::{
    open_store, ActiveEventContext, GeoproofConfig, KeyValueStore, ServerSync, SyncQueue, SystemClock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Flush,
    Clear,
}

/// CLI configuration
struct Config {
    /// Directory holding the persistent store
    data_dir: PathBuf,
    command: Command,
}

fn usage() {
    println!("geoproof-ctl - geoproof state inspector");
    println!();
    println!("USAGE:");
    println!("    geoproof-ctl [OPTIONS] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    status    Show the armed event, queued records, and last transition");
    println!("    flush     Deliver queued records (reads GEOPROOF_LEDGER_* variables)");
    println!("    clear     Forget the armed event");
    println!();
    println!("OPTIONS:");
    println!("    -d, --data-dir <DIR>      Store directory [default: ./geoproof.data]");
    println!("    -h, --help                Print help information");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir = PathBuf::from("./geoproof.data");
    let mut command = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                if i + 1 < args.len() {
                    data_dir = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("error: --data-dir requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "status" => {
                command = Some(Command::Status);
                i += 1;
            }
            "flush" => {
                command = Some(Command::Flush);
                i += 1;
            }
            "clear" => {
                command = Some(Command::Clear);
                i += 1;
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    let Some(command) = command else {
        eprintln!("error: a command is required");
        usage();
        std::process::exit(1);
    };
    Config { data_dir, command }
}

async fn status(store: Arc<dyn KeyValueStore>) {
    let context = ActiveEventContext::new(Arc::clone(&store), Arc::new(SystemClock));
    match context.current() {
        Some(meta) => {
            let end = meta
                .active_event_end_utc
                .map_or_else(|| "open".to_string(), to_iso);
            println!("active event:    {} (ends {end}, saved {})", meta.event_id, to_iso(meta.saved_at));
        }
        None => println!("active event:    none"),
    }

    let queue = SyncQueue::new(Arc::clone(&store));
    let records = queue.records().await;
    println!("queued records:  {}", records.len());
    for record in &records {
        println!("    {} {} {} {}", to_iso(record.at), record.dir, record.event_id, record.idem);
    }

    let debouncer = Debouncer::new(Arc::clone(&store), Arc::new(SystemClock));
    match debouncer.last_marker() {
        Some(marker) => println!("last transition: {} at {}", marker.direction, to_iso(marker.at)),
        None => println!("last transition: none"),
    }
}

async fn flush(store: Arc<dyn KeyValueStore>) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(HttpLedger::new(LedgerConfig::from_env()?));
    let timeout = Duration::from_millis(GeoproofConfig::default().delivery_timeout_ms);
    let sync = ServerSync::new(ledger, timeout);

    let report = SyncQueue::new(store).flush_once(&sync).await;
    println!(
        "delivered {}, remaining {}{}",
        report.delivered,
        report.remaining,
        if report.halted { " (stopped at a failed delivery)" } else { "" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args();
    init_tracing("warn");

    // Holds the store lock for the process lifetime.
    let store: Arc<dyn KeyValueStore> = Arc::new(open_store(&config.data_dir, None)?);

    match config.command {
        Command::Status => status(store).await,
        Command::Flush => flush(store).await?,
        Command::Clear => {
            ActiveEventContext::new(store, Arc::new(SystemClock)).clear_active_event();
            println!("active event cleared");
        }
    }
    Ok(())
}
