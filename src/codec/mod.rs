//! Codec pipeline (C1): serialize, optionally compress, and reverse both
//! steps. The only external contract is round-trip fidelity; the wire
//! format of the inner serializer is this component's own concern.
//!
//! Wire format produced by [`encode_payload`]:
//!
//! ```text
//! byte 0 == 0x01  -> raw codec output follows
//! byte 0 == 0x02  -> gzip-compressed codec output follows
//! ```
//!
//! The leading tag byte is this crate's "magic bytes" framing discriminator
//! (per SPEC_FULL.md §4.1); it also guarantees `encode_payload` never
//! produces the single-byte sequence `[0x00]` reserved as the memoized-null
//! marker, regardless of what the inner codec would otherwise emit for a
//! trivial value.

mod compression;
mod json;
mod postcard;

pub use json::JsonCodec;
pub use postcard::PostcardCodec;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::warn;

/// The reserved payload denoting a memoized null result. Disjoint from
/// every possible `encode_payload` output (see module docs).
pub const NULL_MARKER: [u8; 1] = [0x00];

const TAG_RAW: u8 = 0x01;
const TAG_GZIP: u8 = 0x02;

/// Pluggable serialization backend. Generic (not object-safe) by design,
/// mirroring the codec's use as a static type parameter on the engine —
/// the serialize/deserialize methods are themselves generic over the
/// caller's value type.
pub trait CacheCodec: Send + Sync + Debug {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
    fn name(&self) -> &'static str;
}

/// Encode a value through `codec`, wrapping it with gzip framing when
/// `compress` is set and the serialized length reaches `threshold`.
///
/// # Errors
/// Returns an error only if the inner codec fails to serialize `value`;
/// compression failures are handled internally (fall back to the
/// uncompressed payload) per the failure taxonomy.
pub fn encode_payload<C: CacheCodec, T: Serialize + ?Sized>(
    codec: &C,
    value: &T,
    compress: bool,
    threshold: usize,
) -> Result<Vec<u8>> {
    let raw = codec.serialize(value)?;

    if compress && raw.len() >= threshold {
        match compression::gzip_compress(&raw) {
            Ok(compressed) => {
                let mut out = Vec::with_capacity(compressed.len() + 1);
                out.push(TAG_GZIP);
                out.extend_from_slice(&compressed);
                return Ok(out);
            }
            Err(err) => {
                warn!(error = %err, codec = codec.name(), "compression failed, storing uncompressed payload");
            }
        }
    }

    let mut out = Vec::with_capacity(raw.len() + 1);
    out.push(TAG_RAW);
    out.extend_from_slice(&raw);
    Ok(out)
}

/// Reverse [`encode_payload`]. `bytes` must not be the null marker — callers
/// check that disjointly per SPEC_FULL.md §4.6 step 5.
///
/// # Errors
/// Returns an error if the framing tag is unrecognized, decompression
/// fails, or the inner codec fails to deserialize.
pub fn decode_payload<C: CacheCodec, T: DeserializeOwned>(codec: &C, bytes: &[u8]) -> Result<T> {
    let Some((&tag, body)) = bytes.split_first() else {
        bail!("empty payload cannot be decoded");
    };
    match tag {
        TAG_RAW => codec.deserialize(body),
        TAG_GZIP => {
            let raw = compression::gzip_decompress(body)?;
            codec.deserialize(&raw)
        }
        other => bail!("unrecognized codec framing tag {other:#x}"),
    }
}
