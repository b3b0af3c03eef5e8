//! Cache entries and payload compression

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use super::CacheError;

/// How aggressively a payload is compressed before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Stored as-is
    #[default]
    None,
    /// Fast gzip
    Light,
    /// Best-ratio gzip
    Heavy,
}

impl CompressionLevel {
    fn gzip_level(self) -> Option<Compression> {
        match self {
            CompressionLevel::None => None,
            CompressionLevel::Light => Some(Compression::fast()),
            CompressionLevel::Heavy => Some(Compression::best()),
        }
    }

    /// Compresses logical bytes at this level
    pub fn compress(self, raw: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.gzip_level() {
            None => Ok(raw.to_vec()),
            Some(level) => {
                let mut encoder = GzEncoder::new(Vec::new(), level);
                encoder.write_all(raw)?;
                encoder.finish()
            }
        }
    }

    /// Reverses [`CompressionLevel::compress`]
    pub fn decompress(self, stored: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            CompressionLevel::None => Ok(stored.to_vec()),
            CompressionLevel::Light | CompressionLevel::Heavy => {
                let mut out = Vec::new();
                GzDecoder::new(stored).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::None => "none",
            CompressionLevel::Light => "light",
            CompressionLevel::Heavy => "heavy",
        };
        f.write_str(name)
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "light" => Ok(Self::Light),
            "heavy" => Ok(Self::Heavy),
            _ => Err(format!("Unknown compression level: {}", s)),
        }
    }
}

/// A stored value plus its bookkeeping
///
/// `payload` holds the bytes exactly as stored, so `size_bytes` is the
/// compressed length rather than the size of the logical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Logical identifier, e.g. `quote:AAPL`
    pub key: String,
    /// Serialized value, compressed per `compression`
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub payload: Vec<u8>,
    /// When the value was first stored
    pub created_at: DateTime<Utc>,
    /// Last successful retrieval (equals `created_at` until read)
    pub last_accessed_at: DateTime<Utc>,
    /// Number of successful retrievals
    pub access_count: u64,
    /// Length of `payload`
    pub size_bytes: u64,
    /// Level `payload` was compressed with
    pub compression: CompressionLevel,
    /// Write order issued by the coordinator; copies between tiers keep it
    #[serde(default)]
    pub version: u64,
}

impl CacheEntry {
    /// Builds an entry from already-serialized logical bytes
    pub fn from_bytes(
        key: impl Into<String>,
        raw: &[u8],
        compression: CompressionLevel,
        now: DateTime<Utc>,
    ) -> Result<Self, CacheError> {
        let payload = compression.compress(raw)?;
        Ok(Self {
            key: key.into(),
            size_bytes: payload.len() as u64,
            payload,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            compression,
            version: 0,
        })
    }

    /// Serializes `value` to JSON and wraps it in an entry
    pub fn encode<T: Serialize + ?Sized>(
        key: impl Into<String>,
        value: &T,
        compression: CompressionLevel,
        now: DateTime<Utc>,
    ) -> Result<Self, CacheError> {
        let raw = serde_json::to_vec(value)?;
        Self::from_bytes(key, &raw, compression, now)
    }

    /// Returns the uncompressed JSON bytes
    pub fn logical_bytes(&self) -> Result<Vec<u8>, CacheError> {
        self.compression
            .decompress(&self.payload)
            .map_err(|e| CacheError::Corrupt {
                key: self.key.clone(),
                reason: e.to_string(),
            })
    }

    /// Decodes the payload back into a value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        let raw = self.logical_bytes()?;
        serde_json::from_slice(&raw).map_err(|e| CacheError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    /// Re-encodes the payload at another level, keeping timestamps, counters and version
    pub fn recompress(mut self, compression: CompressionLevel) -> Result<Self, CacheError> {
        if compression == self.compression {
            return Ok(self);
        }
        let raw = self.logical_bytes()?;
        self.payload = compression.compress(&raw)?;
        self.size_bytes = self.payload.len() as u64;
        self.compression = compression;
        Ok(self)
    }

    /// Records a successful retrieval
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }

    /// Time elapsed since the entry was created
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}
