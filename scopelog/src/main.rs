//! # scopelog - Event Log Inspector
//!
//! - **Dump** (`scopelog dump <FILE>`): print every record, as text or JSON lines
//! - **Summary** (`scopelog summary <FILE>`): record counts, frames and entities

use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use scopelog::cli::{Args, Command};
use scopelog::dump::{filter_entity, write_records, LogSummary};
use scopelog::eventlog::read_log;
use scopelog_common::FormatError;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DATAERR: i32 = 65;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FormatError>() {
        Some(FormatError::Io(_)) | None => EXIT_ERROR,
        Some(_) => EXIT_DATAERR,
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Dump { file, json, entity } => {
            let records = read_log(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            debug!("Decoded {} records from {}", records.len(), file.display());

            let records = filter_entity(records, entity);
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            write_records(&mut out, &records, json)?;
            out.flush()?;
        }
        Command::Summary { file } => {
            let records = read_log(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print!("{}", LogSummary::from_records(&records));
        }
    }

    Ok(())
}
