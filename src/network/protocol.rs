// src/network/protocol.rs
//! Binary pool protocol (version 0.7)
//!
//! Client to server: one hello right after connecting, then 88-byte share
//! submissions. Server to client: a one-byte message type followed by a
//! type-specific payload.

use crate::stats::reporter::ShareResult;
use crate::types::{BlockHeader, HEADER_SIZE, SUBMISSION_SIZE, TEMPLATE_PAYLOAD_SIZE};
use crate::utils::error::MinerError;
use sha2::{Digest, Sha256};
use std::io::Read;

/// Protocol major version announced in the hello
pub const VERSION_MAJOR: u8 = 0;

/// Protocol minor version announced in the hello
pub const VERSION_MINOR: u8 = 7;

/// Server message carrying a new work template
pub const MSG_TEMPLATE: u8 = 0;

/// Server message carrying the result of a submitted share
pub const MSG_SHARE_RESULT: u8 = 1;

/// Server keepalive
pub const MSG_KEEPALIVE: u8 = 2;

/// Result codes above this are treated as a found block
pub const RESULT_CODE_CAP: i32 = 1000;

/// Login message sent once per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Payout address or pool account
    pub username: String,
    /// Number of worker threads
    pub threads: u8,
    /// Pool fee percentage offered
    pub fee: u8,
    /// Miner software identifier
    pub miner_id: u16,
    /// Password as sent on the wire (see [`derive_pool_password`])
    pub password: String,
}

impl Hello {
    /// Serializes the hello
    ///
    /// Layout: `[ulen][username][0][major][minor][threads][fee][miner_id LE]
    /// [0u32 x3][plen][password][extensions LE = 0]`.
    ///
    /// # Errors
    /// `InputError` if the username or password is longer than 255 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, MinerError> {
        let username = length_prefix("username", &self.username)?;
        let password = length_prefix("password", &self.password)?;

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(username);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.push(VERSION_MAJOR);
        out.push(VERSION_MINOR);
        out.push(self.threads);
        out.push(self.fee);
        out.extend_from_slice(&self.miner_id.to_le_bytes());
        out.extend_from_slice(&[0u8; 12]);
        out.push(password);
        out.extend_from_slice(self.password.as_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        Ok(out)
    }

    /// Size of the encoded message
    pub fn encoded_len(&self) -> usize {
        self.username.len() + self.password.len() + 23
    }

    /// Parses a hello as the pool sees it, returning it with the bytes consumed
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), MinerError> {
        let mut cursor = bytes;
        let username = read_prefixed(&mut cursor, "username")?;
        let fixed = take(&mut cursor, 20)?;
        if fixed[0] != 0 {
            return Err(MinerError::ProtocolError(
                "hello is missing the v0.4+ marker".into(),
            ));
        }
        if fixed[1] != VERSION_MAJOR || fixed[2] != VERSION_MINOR {
            return Err(MinerError::ProtocolError(format!(
                "unsupported protocol version {}.{}",
                fixed[1], fixed[2]
            )));
        }
        let threads = fixed[3];
        let fee = fixed[4];
        let miner_id = u16::from_le_bytes([fixed[5], fixed[6]]);
        // The length byte of the password is the last byte of the fixed block
        let password_len = fixed[19] as usize;
        let password = utf8(take(&mut cursor, password_len)?, "password")?;
        take(&mut cursor, 2)?;

        let hello = Hello {
            username,
            threads,
            fee,
            miner_id,
            password,
        };
        let consumed = hello.encoded_len();
        Ok((hello, consumed))
    }
}

/// Derives the password actually sent to the pool from the configured one
///
/// The configured password is hashed with SHA-256 and folded into a short
/// hex string made of two XOR-folded bytes of the digest, the first padded
/// to five hex digits.
pub fn derive_pool_password(password: &str) -> String {
    let pw = Sha256::digest(password.as_bytes());
    format!(
        "{:05x}{:x}",
        pw[0] ^ pw[5] ^ pw[2] ^ pw[7],
        pw[4] ^ pw[1] ^ pw[6] ^ pw[3]
    )
}

/// Message received from the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// New work; birthdays are zero and the time is the server's
    Template(BlockHeader),
    /// Raw result code of a submitted share
    ShareResult(i32),
    /// Nothing to do
    KeepAlive,
    /// Unknown type byte, no payload consumed
    Unknown(u8),
}

impl ServerMessage {
    /// Reads one message, blocking until it is complete
    ///
    /// # Errors
    /// `IoError` when the stream fails or ends mid-message; a clean close
    /// surfaces as `UnexpectedEof`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, MinerError> {
        let mut kind = [0u8; 1];
        reader.read_exact(&mut kind)?;

        match kind[0] {
            MSG_TEMPLATE => {
                let mut payload = [0u8; TEMPLATE_PAYLOAD_SIZE];
                reader.read_exact(&mut payload)?;
                Ok(ServerMessage::Template(BlockHeader::from_template_payload(
                    &payload,
                )))
            }
            MSG_SHARE_RESULT => {
                let mut code = [0u8; 4];
                reader.read_exact(&mut code)?;
                Ok(ServerMessage::ShareResult(i32::from_le_bytes(code)))
            }
            MSG_KEEPALIVE => Ok(ServerMessage::KeepAlive),
            other => Ok(ServerMessage::Unknown(other)),
        }
    }
}

/// Maps a raw result code to its outcome
///
/// Codes above [`RESULT_CODE_CAP`] count as a block.
pub fn classify_result(code: i32) -> ShareResult {
    let code = if code > RESULT_CODE_CAP { 1 } else { code };
    match code {
        c if c < 0 => ShareResult::Stale,
        0 => ShareResult::Rejected,
        1 => ShareResult::Block,
        _ => ShareResult::Share,
    }
}

/// Wire form of a share: the commitment followed by both birthdays
pub fn encode_submission(header: &BlockHeader) -> [u8; SUBMISSION_SIZE] {
    header.submission()
}

/// Header fields carried by a share on the wire
///
/// The share target is not transmitted and comes back zeroed.
pub fn decode_submission(wire: &[u8; SUBMISSION_SIZE]) -> BlockHeader {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[..SUBMISSION_SIZE].copy_from_slice(wire);
    BlockHeader::from_bytes(&bytes)
}

fn length_prefix(field: &str, value: &str) -> Result<u8, MinerError> {
    u8::try_from(value.len()).map_err(|_| {
        MinerError::InputError(format!(
            "{} is {} bytes, the protocol allows at most 255",
            field,
            value.len()
        ))
    })
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], MinerError> {
    if cursor.len() < len {
        return Err(MinerError::ProtocolError(format!(
            "hello truncated: need {} more bytes, have {}",
            len,
            cursor.len()
        )));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn read_prefixed(cursor: &mut &[u8], field: &str) -> Result<String, MinerError> {
    let len = take(cursor, 1)?[0] as usize;
    utf8(take(cursor, len)?, field)
}

fn utf8(bytes: &[u8], field: &str) -> Result<String, MinerError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MinerError::ProtocolError(format!("{} is not UTF-8: {}", field, e)))
}
