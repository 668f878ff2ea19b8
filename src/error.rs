//! Error handling for the grape-decimator library
//!
//! Per-minute faults (missing or undecodable segments, rejected writes) never
//! surface here: they are reported through `Option` and `bool` returns. This
//! type covers what a caller can actually act on: I/O on the output artifact,
//! bad dates, bad configuration, and a channel run that failed as a whole.

use std::io;

use thiserror::Error;

/// A specialized Result type for grape-decimator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for grape-decimator operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (output artifact, directory scans)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata table could not be serialized or parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Date string is neither `YYYYMMDD` nor `YYYY-MM-DD`
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Output rate does not evenly divide the input rate
    #[error("Unsupported rate ratio: {input_rate} Hz -> {output_rate} Hz")]
    UnsupportedRateRatio { input_rate: u32, output_rate: u32 },

    /// Pipeline configuration rejected before any channel ran
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another writer already holds this channel-day buffer
    #[error("Buffer busy: {0}")]
    BufferBusy(String),

    /// A whole channel-day run failed
    #[error("Channel {channel} failed: {source}")]
    Channel {
        channel: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Wrap an error with the channel it occurred in
    pub fn channel<S: Into<String>>(channel: S, source: Error) -> Self {
        Error::Channel {
            channel: channel.into(),
            source: Box::new(source),
        }
    }
}
