//! Per-day orchestration.
//!
//! A [`Pipeline`] turns one UTC day of raw archive into one decimated daily
//! buffer per channel. Each channel-day is a [`ChannelJob`]: one reader, one
//! decimator and one buffer, driven strictly in minute order. Jobs share
//! nothing, so a failing channel is recorded in the [`DayReport`] and the
//! others carry on.

use std::path::PathBuf;
use std::thread;

use chrono::NaiveDate;
use crossbeam::channel::unbounded;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::buffer::DailyBuffer;
use crate::calendar::SECONDS_PER_MINUTE;
use crate::channel::{Channel, discover_channels};
use crate::dsp::decimator::Decimator;
use crate::error::{Error, Result};
use crate::metadata::SlotMetadata;
use crate::reader::RawSegmentReader;
use crate::station::Station;
use crate::{DEFAULT_OUTPUT_RATE, NOMINAL_INPUT_RATE};

/// Tunables of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root holding `raw_archive/`, `raw_buffer/` and `products/`
    pub data_root: PathBuf,
    pub output_rate: u32,
    /// Input rate assumed when no segment declares one
    pub nominal_input_rate: u32,
    /// Channels processed concurrently
    pub workers: usize,
    /// Samples a minute may be off nominal length and still be framed;
    /// `None` keeps the decimator default of 10 ms
    pub max_jitter: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            output_rate: DEFAULT_OUTPUT_RATE,
            nominal_input_rate: NOMINAL_INPUT_RATE,
            workers: 1,
            max_jitter: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_rate == 0 {
            return Err(Error::config("output rate must be non-zero"));
        }
        if self.nominal_input_rate == 0 {
            return Err(Error::config("nominal input rate must be non-zero"));
        }
        if self.nominal_input_rate % self.output_rate != 0 {
            return Err(Error::UnsupportedRateRatio {
                input_rate: self.nominal_input_rate,
                output_rate: self.output_rate,
            });
        }
        if self.workers == 0 {
            return Err(Error::config("at least one worker is required"));
        }
        if !self.data_root.is_dir() {
            return Err(Error::config(format!(
                "data root {} is not a directory",
                self.data_root.display()
            )));
        }
        Ok(())
    }
}

/// What one channel-day run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub channel: String,
    /// Station the channel belongs to, when its name starts with a call sign
    pub station: Option<Station>,
    pub date: NaiveDate,
    /// Rate the decimator actually ran at
    pub input_rate: u32,
    pub output_rate: u32,
    /// The nominal rate was used because the declared one contradicted the
    /// recorded samples or did not divide by the output rate
    pub rate_fallback: bool,
    /// Listed minutes
    pub minutes_found: usize,
    /// Minutes written to the buffer
    pub minutes_processed: usize,
    pub samples_generated: usize,
    /// Listed minutes with no readable samples
    pub absent_minutes: usize,
    /// Unlisted minutes between the first and last listed ones
    pub skipped_minutes: usize,
    /// Sum of upstream-reported gap samples
    pub gap_samples: u64,
    pub rejected_writes: usize,
    /// Minutes declaring a rate other than the run rate
    pub rate_mismatches: usize,
}

impl ChannelSummary {
    fn new(channel: &Channel, date: NaiveDate, input_rate: u32, output_rate: u32) -> Self {
        Self {
            channel: channel.name().to_string(),
            station: channel.station(),
            date,
            input_rate,
            output_rate,
            rate_fallback: false,
            minutes_found: 0,
            minutes_processed: 0,
            samples_generated: 0,
            absent_minutes: 0,
            skipped_minutes: 0,
            gap_samples: 0,
            rejected_writes: 0,
            rate_mismatches: 0,
        }
    }

    /// Minutes with no output between the first and last listed minute.
    pub fn gaps(&self) -> usize {
        self.absent_minutes + self.skipped_minutes
    }

    pub fn is_empty(&self) -> bool {
        self.minutes_found == 0
    }
}

/// Outcome of processing one day.
#[derive(Debug, Default)]
pub struct DayReport {
    pub summaries: Vec<ChannelSummary>,
    /// One [`Error::Channel`] per channel that could not be processed
    pub failures: Vec<Error>,
}

impl DayReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn minutes_processed(&self) -> usize {
        self.summaries.iter().map(|s| s.minutes_processed).sum()
    }

    pub fn summary(&self, channel: &str) -> Option<&ChannelSummary> {
        self.summaries.iter().find(|s| s.channel == channel)
    }

    fn record(&mut self, channel: &Channel, result: Result<ChannelSummary>) {
        match result {
            Ok(summary) => self.summaries.push(summary),
            Err(e) => {
                error!("{}: channel failed: {}", channel, e);
                self.failures.push(Error::channel(channel.name(), e));
            }
        }
    }
}

/// One channel-day of work.
#[derive(Debug, Clone)]
pub struct ChannelJob {
    config: PipelineConfig,
    channel: Channel,
    date: NaiveDate,
}

impl ChannelJob {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    fn decimator(&self, input_rate: u32) -> Result<Decimator> {
        let decimator = Decimator::new(input_rate, self.config.output_rate)?;
        Ok(match self.config.max_jitter {
            Some(jitter) => decimator.with_max_jitter(jitter),
            None => decimator,
        })
    }

    /// Reads, decimates and stores every minute of the day, in order.
    pub fn run(&self) -> Result<ChannelSummary> {
        let root = &self.config.data_root;
        let output_rate = self.config.output_rate;
        let reader = RawSegmentReader::new(root, self.channel.clone());

        let resolved = reader.resolve_rate(self.date);
        let (mut decimator, rate_fallback) = match self.decimator(resolved.rate) {
            Ok(d) => (d, resolved.fallback),
            Err(e) => {
                warn!(
                    "{}: {}, falling back to nominal {} Hz",
                    self.channel,
                    e,
                    self.channel.nominal_rate()
                );
                (self.decimator(self.channel.nominal_rate())?, true)
            }
        };

        let mut summary =
            ChannelSummary::new(&self.channel, self.date, decimator.input_rate(), output_rate);
        summary.rate_fallback = rate_fallback;

        let segments = reader.iterate_day(self.date);
        summary.minutes_found = segments.len();
        if summary.is_empty() {
            warn!("{}: no data for {}", self.channel, self.date);
            return Ok(summary);
        }

        let mut buffer = DailyBuffer::open(root, &self.channel, self.date, output_rate)?;
        let mut previous: Option<i64> = None;
        let mut wrote_any = false;
        let mut after_gap = false;

        for segment in segments {
            let ts = segment.timestamp;
            if let Some(prev) = previous {
                let skipped = ((ts - prev) / SECONDS_PER_MINUTE - 1).max(0) as usize;
                if skipped > 0 {
                    debug!("{}: {} minutes missing before {}", self.channel, skipped, ts);
                    summary.skipped_minutes += skipped;
                    after_gap = true;
                }
            }
            previous = Some(ts);

            if !segment.is_present() {
                debug!("{}: no samples for minute {}", self.channel, ts);
                summary.absent_minutes += 1;
                after_gap = true;
                continue;
            }
            let samples = segment.samples.unwrap_or_default();

            if let Some(meta) = &segment.metadata {
                summary.gap_samples += meta.gap_samples();
                if let Some(rate) = meta.declared_rate()
                    && rate != decimator.input_rate()
                {
                    warn!(
                        "{}: minute {} declares {} Hz, processing at {} Hz",
                        self.channel,
                        ts,
                        rate,
                        decimator.input_rate()
                    );
                    summary.rate_mismatches += 1;
                }
            }

            let decimated = decimator.process_minute(&samples);
            summary.samples_generated += decimated.len();

            let row = SlotMetadata {
                follows_gap: after_gap && wrote_any,
                ..SlotMetadata::from_minute(segment.metadata.as_ref())
            };
            if buffer.write_minute(ts, &decimated, &row) {
                summary.minutes_processed += 1;
                wrote_any = true;
                after_gap = false;
            } else {
                summary.rejected_writes += 1;
                after_gap = true;
            }
        }

        info!(
            "{} {}: {}/{} minutes written, {} samples, {} gaps, {} rejected",
            summary.channel,
            summary.date,
            summary.minutes_processed,
            summary.minutes_found,
            summary.samples_generated,
            summary.gaps(),
            summary.rejected_writes
        );
        Ok(summary)
    }
}

/**
 * Day-level driver over every channel of a data root
 */
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validates `config`; the only failure that stops a whole run.
    pub fn new(mut config: PipelineConfig) -> Result<Self> {
        config.data_root = crate::expanduser(config.data_root);
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Channels to process: `channel` alone, or every discovered channel.
    pub fn channels(&self, channel: Option<&str>) -> Result<Vec<Channel>> {
        let channels = match channel {
            Some(name) => vec![Channel::new(name)],
            None => discover_channels(&self.config.data_root)?,
        };
        Ok(channels
            .into_iter()
            .map(|c| c.with_nominal_rate(self.config.nominal_input_rate))
            .collect())
    }

    /// One job per channel for `date`.
    pub fn channel_jobs(&self, date: NaiveDate, channel: Option<&str>) -> Result<Vec<ChannelJob>> {
        let jobs: Vec<_> = self
            .channels(channel)?
            .into_iter()
            .map(|channel| ChannelJob {
                config: self.config.clone(),
                channel,
                date,
            })
            .collect();
        if jobs.is_empty() {
            warn!(
                "No channels found under {}",
                self.config.data_root.display()
            );
        }
        Ok(jobs)
    }

    /// Processes `date` for one channel or all of them, spread over the
    /// configured number of workers.
    pub fn process_day(&self, date: NaiveDate, channel: Option<&str>) -> Result<DayReport> {
        self.process_day_parallel(date, channel, self.config.workers)
    }

    /// Like [`Pipeline::process_day`] with an explicit worker count.
    /// Summaries come back in channel order either way.
    pub fn process_day_parallel(
        &self,
        date: NaiveDate,
        channel: Option<&str>,
        workers: usize,
    ) -> Result<DayReport> {
        let jobs = self.channel_jobs(date, channel)?;
        let workers = workers.clamp(1, jobs.len().max(1));
        if workers == 1 {
            return Ok(run_sequential(jobs));
        }

        let (job_tx, job_rx) = unbounded::<ChannelJob>();
        let (result_tx, result_rx) = unbounded();
        for job in jobs {
            job_tx
                .send(job)
                .map_err(|_| Error::config("job queue closed"))?;
        }
        drop(job_tx);

        thread::scope(|s| {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for job in job_rx.iter() {
                        debug!("Worker {} takes {}", worker, job.channel());
                        let result = job.run();
                        if result_tx.send((job.channel, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results: Vec<_> = result_rx.iter().collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        let mut report = DayReport::default();
        for (channel, result) in results {
            report.record(&channel, result);
        }
        Ok(report)
    }
}

fn run_sequential(jobs: Vec<ChannelJob>) -> DayReport {
    let mut report = DayReport::default();
    for job in jobs {
        report.record(job.channel(), job.run());
    }
    report
}
