//! Thin CLI surface over the `dflog_rs` library: exercises the reader
//! during development. This is the "external collaborator" named in
//! spec.md §1 (the command-line entry point), not part of the core.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dflog_rs::reader::{Reader, ReaderOptions};
use time::OffsetDateTime;

fn format_stamp(epoch_seconds: f64) -> String {
    if !epoch_seconds.is_finite() {
        return "-".to_string();
    }
    match OffsetDateTime::from_unix_timestamp(epoch_seconds as i64) {
        Ok(dt) => dt.to_string(),
        Err(_) => format!("{epoch_seconds:.3}"),
    }
}

#[derive(Parser)]
#[command(name = "dflog", about = "Read ArduPilot DataFlash logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream decoded messages.
    Dump {
        path: PathBuf,
        /// Only show records of this message type (e.g. `GPS`).
        #[arg(long = "type")]
        type_name: Option<String>,
        /// Emit each message as a JSON object.
        #[arg(long)]
        json: bool,
    },
    /// Print the flight-mode timeline.
    Modes { path: PathBuf },
    /// Print the last-seen parameter table.
    Params { path: PathBuf },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(%err, "dflog failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> dflog_rs::DfResult<()> {
    match cli.command {
        Command::Dump { path, type_name, json } => dump(path, type_name, json),
        Command::Modes { path } => modes(path),
        Command::Params { path } => params(path),
    }
}

#[derive(serde::Serialize)]
struct DumpRecord {
    #[serde(rename = "type")]
    type_name: String,
    timestamp: f64,
    fields: std::collections::BTreeMap<String, f64>,
}

fn dump(path: PathBuf, type_name: Option<String>, json: bool) -> dflog_rs::DfResult<()> {
    let mut reader = Reader::open(path, ReaderOptions::default())?;
    while let Some(msg) = reader.recv_msg() {
        if let Some(ref want) = type_name {
            if msg.type_name() != want {
                continue;
            }
        }
        if json {
            let fields = msg
                .format
                .columns
                .iter()
                .filter_map(|col| msg.get_field(col).map(|v| (col.clone(), v)))
                .collect();
            let record = DumpRecord {
                type_name: msg.type_name().to_string(),
                timestamp: msg.timestamp,
                fields,
            };
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(%err, "failed to serialize record"),
            }
        } else {
            println!("{} {msg}", format_stamp(msg.timestamp));
        }
    }
    Ok(())
}

fn modes(path: PathBuf) -> dflog_rs::DfResult<()> {
    let mut reader = Reader::open(path, ReaderOptions::default())?;
    for (mode, start, end) in reader.flightmode_list() {
        println!("{mode:<16} {} -> {}", format_stamp(start), format_stamp(end));
    }
    Ok(())
}

fn params(path: PathBuf) -> dflog_rs::DfResult<()> {
    let mut reader = Reader::open(path, ReaderOptions::default())?;
    while reader.recv_msg().is_some() {}
    let mut names: Vec<&String> = reader.params.keys().collect();
    names.sort();
    for name in names {
        let value = reader.params[name];
        match reader.param_defaults.get(name) {
            Some(default) => println!("{name:<20} {value:<16} (default {default})"),
            None => println!("{name:<20} {value}"),
        }
    }
    Ok(())
}
