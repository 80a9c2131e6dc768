//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scopelog",
    version,
    about = "Inspect scoped execution telemetry logs",
    after_help = "\
EXAMPLES:
    scopelog dump run.scopelog                 Print every record
    scopelog dump run.scopelog --entity 3      Records of entity 3 only
    scopelog dump run.scopelog --json          One JSON object per record
    scopelog summary run.scopelog              Record counts and duration"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the records of a log
    Dump {
        /// Compressed event log to read
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,

        /// Only show records of this entity id
        #[arg(long, value_name = "ID")]
        entity: Option<u64>,
    },

    /// Print aggregate statistics of a log
    Summary {
        /// Compressed event log to read
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
