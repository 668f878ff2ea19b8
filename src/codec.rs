//! Raw segment encodings.
//!
//! A minute of samples is stored as `<epoch>.bin`, optionally wrapped in a
//! lossless container chosen by an extra suffix. [`CODECS`] is the only place
//! that knows about encodings: the reader walks it in order and never names a
//! format itself, so supporting another container means adding a row.

use std::io::{self, Read};

use lz4_flex::frame::FrameDecoder;

/// Decode a file's bytes into the flat I/Q payload.
pub type DecodeFn = fn(&[u8]) -> io::Result<Vec<u8>>;

/// One supported on-disk encoding.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    /// Short name for logs
    pub name: &'static str,
    /// File-name suffix following the epoch stem
    pub suffix: &'static str,
    pub decode: DecodeFn,
}

/// Supported encodings in precedence order.
pub static CODECS: &[Codec] = &[
    Codec {
        name: "raw",
        suffix: ".bin",
        decode: decode_raw,
    },
    Codec {
        name: "zstd",
        suffix: ".bin.zst",
        decode: decode_zstd,
    },
    Codec {
        name: "lz4",
        suffix: ".bin.lz4",
        decode: decode_lz4,
    },
    Codec {
        name: "gzip",
        suffix: ".bin.gz",
        decode: decode_gzip,
    },
];

/// Metadata sidecar suffix.
pub const METADATA_SUFFIX: &str = ".json";

/// Split a segment file name into its epoch stem and codec.
///
/// Returns `None` for files that are not segments (metadata, temporaries,
/// non-numeric stems).
pub fn match_file_name(file_name: &str) -> Option<(i64, &'static Codec)> {
    CODECS.iter().find_map(|codec| {
        let stem = file_name.strip_suffix(codec.suffix)?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(|ts| (ts, codec))
    })
}

fn decode_raw(bytes: &[u8]) -> io::Result<Vec<u8>> {
    Ok(bytes.to_vec())
}

fn decode_zstd(bytes: &[u8]) -> io::Result<Vec<u8>> {
    zstd::stream::decode_all(bytes)
}

fn decode_lz4(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    FrameDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

fn decode_gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}
