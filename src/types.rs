// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of the full header record (commitment + birthdays + share target)
pub const HEADER_SIZE: usize = 120;

/// Bytes of the header hashed to derive the search midstate
pub const COMMITMENT_SIZE: usize = 80;

/// Bytes of the header hashed for the proof-of-work check (commitment + birthdays)
pub const SUBMISSION_SIZE: usize = 88;

/// Template payload sent by the pool: commitment fields followed by the share target
pub const TEMPLATE_PAYLOAD_SIZE: usize = COMMITMENT_SIZE + 32;

/// Block header used by the Momentum proof-of-work
///
/// Fields are encoded little-endian in declaration order, giving a fixed
/// 120-byte record. `birthday_a`/`birthday_b` are only written by the
/// collision search once a collision has been revalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Block version
    pub version: i32,
    /// Hash of the previous block
    pub prev_hash: [u8; 32],
    /// Merkle root of the block transactions
    pub merkle_root: [u8; 32],
    /// Block timestamp, rewritten per worker and per round
    pub time: u32,
    /// Compact network difficulty
    pub bits: u32,
    /// Header nonce
    pub nonce: u32,
    /// First collision index
    pub birthday_a: u32,
    /// Second collision index
    pub birthday_b: u32,
    /// Pool share target (256-bit, little-endian words)
    pub target_share: [u8; 32],
}

impl BlockHeader {
    /// Encodes the header into its 120-byte wire/hash layout
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out[80..84].copy_from_slice(&self.birthday_a.to_le_bytes());
        out[84..88].copy_from_slice(&self.birthday_b.to_le_bytes());
        out[88..120].copy_from_slice(&self.target_share);
        out
    }

    /// Decodes a header from its 120-byte layout
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        BlockHeader {
            version: i32::from_le_bytes(word(bytes, 0)),
            prev_hash: array32(&bytes[4..36]),
            merkle_root: array32(&bytes[36..68]),
            time: u32::from_le_bytes(word(bytes, 68)),
            bits: u32::from_le_bytes(word(bytes, 72)),
            nonce: u32::from_le_bytes(word(bytes, 76)),
            birthday_a: u32::from_le_bytes(word(bytes, 80)),
            birthday_b: u32::from_le_bytes(word(bytes, 84)),
            target_share: array32(&bytes[88..120]),
        }
    }

    /// Builds a header from a pool template payload
    ///
    /// The payload carries the 80 commitment bytes followed by the 32-byte
    /// share target; birthdays start out zeroed.
    pub fn from_template_payload(payload: &[u8; TEMPLATE_PAYLOAD_SIZE]) -> Self {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..COMMITMENT_SIZE].copy_from_slice(&payload[..COMMITMENT_SIZE]);
        bytes[SUBMISSION_SIZE..].copy_from_slice(&payload[COMMITMENT_SIZE..]);
        Self::from_bytes(&bytes)
    }

    /// The 80-byte commitment portion hashed into the midstate
    pub fn commitment(&self) -> [u8; COMMITMENT_SIZE] {
        let mut out = [0u8; COMMITMENT_SIZE];
        out.copy_from_slice(&self.to_bytes()[..COMMITMENT_SIZE]);
        out
    }

    /// The 88-byte record submitted to the pool and hashed for proof-of-work
    pub fn submission(&self) -> [u8; SUBMISSION_SIZE] {
        let mut out = [0u8; SUBMISSION_SIZE];
        out.copy_from_slice(&self.to_bytes()[..SUBMISSION_SIZE]);
        out
    }
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

fn array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

/// Formats a 256-bit little-endian value most-significant word first
pub fn format_u256(value: &[u8; 32]) -> String {
    let mut be = *value;
    be.reverse();
    hex::encode(be)
}

/// Selects which digest implementation the search uses
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Streaming SHA-512/SHA-256 from the `sha2` crate
    #[clap(name = "portable")]
    Portable,

    /// Single-block SHA-512 compression over the pre-padded midstate block
    ///
    /// Skips the streaming buffer bookkeeping; `sha2` picks the fastest
    /// compression backend the CPU supports at runtime.
    #[default]
    #[clap(name = "compress")]
    Compress,
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashMode::Portable => write!(f, "portable"),
            HashMode::Compress => write!(f, "compress"),
        }
    }
}

impl FromStr for HashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "portable" | "sph" => Ok(HashMode::Portable),
            "compress" | "sse4" | "avx" => Ok(HashMode::Compress),
            _ => Err(format!("Unknown hash mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: -2,
            prev_hash: [0x11; 32],
            merkle_root: [0x22; 32],
            time: 0x5300_0001,
            bits: 0x1d00_ffff,
            nonce: 7,
            birthday_a: 0x0123_4567,
            birthday_b: 0x0089_abcd,
            target_share: [0x33; 32],
        }
    }

    #[test]
    fn test_header_layout_offsets() {
        let bytes = sample_header().to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &(-2i32).to_le_bytes());
        assert_eq!(&bytes[68..72], &0x5300_0001u32.to_le_bytes());
        assert_eq!(&bytes[80..84], &0x0123_4567u32.to_le_bytes());
        assert_eq!(&bytes[84..88], &0x0089_abcdu32.to_le_bytes());
        assert_eq!(&bytes[88..120], &[0x33; 32]);
    }

    #[test]
    fn test_header_bytes_roundtrip() {
        let header = sample_header();
        assert_eq!(BlockHeader::from_bytes(&header.to_bytes()), header);
    }

    #[test]
    fn test_template_payload_zeroes_birthdays() {
        let header = sample_header();
        let mut payload = [0u8; TEMPLATE_PAYLOAD_SIZE];
        payload[..80].copy_from_slice(&header.commitment());
        payload[80..].copy_from_slice(&header.target_share);

        let parsed = BlockHeader::from_template_payload(&payload);
        assert_eq!(parsed.birthday_a, 0);
        assert_eq!(parsed.birthday_b, 0);
        assert_eq!(parsed.time, header.time);
        assert_eq!(parsed.target_share, header.target_share);
    }

    #[test]
    fn test_format_u256_most_significant_first() {
        let mut value = [0u8; 32];
        value[31] = 0xab;
        value[0] = 0x01;
        let text = format_u256(&value);
        assert!(text.starts_with("ab"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn test_hash_mode_parsing() {
        assert_eq!("sph".parse::<HashMode>().unwrap(), HashMode::Portable);
        assert_eq!("AVX".parse::<HashMode>().unwrap(), HashMode::Compress);
        assert!("gpu".parse::<HashMode>().is_err());
    }
}
