//! Two-phase UDP server discovery.
//!
//! Both requests share a 263 byte template carrying a phase marker and a
//! trailing magic. The init reply hands out a session token, which is echoed
//! back with the server-info request. The token travels little-endian while
//! the server-info fields decode big-endian; that asymmetry is what deployed
//! servers speak, so it is kept as is.
use std::time::Instant;

use serde_derive::Serialize;
use tokio::net::UdpSocket;

use super::Response;
use crate::errors::{SaveError, ScanError};

const REQUEST_LEN: usize = 263;
const MAGIC: &[u8; 7] = b"veloren";
const MAGIC_OFFSET: usize = 256;
const PHASE_OFFSET: usize = 13;
const PHASE_INIT: u8 = 1;
const PHASE_SERVER_INFO: u8 = 2;

const INIT_REPLY_LEN: usize = 14;
const TOKEN_REPLY_RANGE: std::ops::Range<usize> = 4..12;
const TOKEN_REQUEST_RANGE: std::ops::Range<usize> = 2..10;

const INFO_REPLY_LEN: usize = 32;
/// Bytes needed to decode every [`ServerInfo`] field.
const INFO_DECODE_LEN: usize = 25;

fn request_template() -> [u8; REQUEST_LEN] {
    let mut request = [0u8; REQUEST_LEN];
    request[PHASE_OFFSET] = PHASE_INIT;
    request[MAGIC_OFFSET..].copy_from_slice(MAGIC);
    request
}

/// Runs both phases on a connected socket and returns the raw server-info
/// datagram. Loss of either datagram surfaces as the caller's deadline.
pub async fn scan(socket: &UdpSocket) -> Result<Option<Response>, ScanError> {
    let mut request = request_template();

    let start = Instant::now();
    socket.send(&request).await?;

    let mut init = [0u8; INIT_REPLY_LEN];
    let received = socket.recv(&mut init).await?;
    let latency = start.elapsed();
    if received < TOKEN_REPLY_RANGE.end {
        return Err(ScanError::ShortDatagram {
            expected: INIT_REPLY_LEN,
            got: received,
        });
    }

    let mut token = [0u8; 8];
    token.copy_from_slice(&init[TOKEN_REPLY_RANGE]);
    let token = u64::from_le_bytes(token);

    request[TOKEN_REQUEST_RANGE].copy_from_slice(&token.to_le_bytes());
    request[PHASE_OFFSET] = PHASE_SERVER_INFO;
    socket.send(&request).await?;

    let mut info = vec![0u8; INFO_REPLY_LEN];
    let received = socket.recv(&mut info).await?;
    if received == 0 {
        return Ok(None);
    }
    info.truncate(received);

    Ok(Some(Response {
        payload: info,
        latency,
    }))
}

/// Decoded server-info reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub hash: u32,
    pub timestamp: u64,
    pub players: u16,
    pub cap: u16,
    pub battle_mode: u8,
}

impl ServerInfo {
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(data: &[u8]) -> Result<Self, SaveError> {
        if data.len() < INFO_DECODE_LEN {
            return Err(SaveError::Decode(format!(
                "server info needs {INFO_DECODE_LEN} bytes, got {}",
                data.len()
            )));
        }

        let be = |range: std::ops::Range<usize>| {
            data[range]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        };

        Ok(Self {
            hash: be(8..12) as u32,
            timestamp: be(12..20),
            players: be(20..22) as u16,
            cap: be(22..24) as u16,
            battle_mode: data[24],
        })
    }
}
