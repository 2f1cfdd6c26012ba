//! Gzip-compatible framing used by the codec pipeline when a payload
//! crosses its configured size threshold.

use anyhow::{Context, Result};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Read;

pub fn gzip_compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(raw, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .context("gzip compression failed")?;
    Ok(out)
}

pub fn gzip_decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .context("gzip decompression failed")?;
    Ok(out)
}
