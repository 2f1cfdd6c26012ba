//! Postcard codec — the engine's default. Compact, deterministic binary
//! serialization with serde compatibility.

use crate::codec::CacheCodec;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Default, Clone)]
pub struct PostcardCodec;

impl CacheCodec for PostcardCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(bytes)?)
    }

    fn name(&self) -> &'static str {
        "postcard"
    }
}
