//! Decimate one UTC day of raw IQ archive into per-channel daily buffers.
//!
//! ```text
//! grape-decimate --data-root ~/grape --date 20251214 --all-channels -v
//! grape-decimate --data-root ~/grape --channel "WWV 10 MHz"
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use grape_decimator::calendar;
use grape_decimator::{DEFAULT_OUTPUT_RATE, Pipeline, PipelineConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decimate raw IQ minutes into gapless daily buffers", long_about = None)]
struct Args {
    /// Root holding raw_archive/, raw_buffer/ and products/ (accepts ~)
    #[arg(long)]
    data_root: PathBuf,

    /// UTC day to process, YYYYMMDD or YYYY-MM-DD (default: today)
    #[arg(long, value_parser = calendar::parse_date)]
    date: Option<NaiveDate>,

    /// Channel name, e.g. "WWV 10 MHz" or WWV_10_MHz
    #[arg(long, required_unless_present = "all_channels")]
    channel: Option<String>,

    /// Process every channel found under the data root
    #[arg(long, default_value_t = false, conflicts_with = "channel")]
    all_channels: bool,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_OUTPUT_RATE)]
    output_rate: u32,

    /// Channels processed concurrently
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> grape_decimator::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let config = PipelineConfig {
        data_root: args.data_root,
        output_rate: args.output_rate,
        workers: args.workers,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config)?;
    let date = args.date.unwrap_or_else(calendar::today);
    let channel = if args.all_channels {
        None
    } else {
        args.channel.as_deref()
    };

    info!("Processing {} under {}", date, pipeline.config().data_root.display());
    let report = pipeline.process_day(date, channel)?;

    for s in &report.summaries {
        println!(
            "{:<20} {}  {:>4}/{:<4} minutes  {:>8} samples  {:>4} gaps  {:>3} rejected",
            s.channel,
            s.date,
            s.minutes_processed,
            s.minutes_found,
            s.samples_generated,
            s.gaps(),
            s.rejected_writes
        );
    }
    for failure in &report.failures {
        error!("{}", failure);
    }
    Ok(())
}
