//! Plain HTTP status probe.
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Response, MAX_RESPONSE_LENGTH};
use crate::address::Address;
use crate::errors::ScanError;

/// `HTTP/1.1 200 OK\r\n` minus the reason phrase tail.
const STATUS_LINE_LEN: usize = 17;
/// Offset of the hundreds digit of the status code.
const STATUS_CLASS_OFFSET: usize = 9;

fn request(host: Address) -> String {
    format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

/// Sends `GET /` and keeps the response only for a 2xx status.
///
/// Anything else yields `Ok(None)` without reading past the status line.
/// The body is read until the peer closes or [`MAX_RESPONSE_LENGTH`] bytes
/// have arrived, whichever comes first.
pub async fn scan<S>(host: Address, stream: &mut S) -> Result<Option<Response>, ScanError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let start = Instant::now();
    stream.write_all(request(host).as_bytes()).await?;

    let mut status = [0u8; STATUS_LINE_LEN];
    stream.read_exact(&mut status).await?;
    let latency = start.elapsed();

    if status[STATUS_CLASS_OFFSET] != b'2' {
        return Ok(None);
    }

    let mut payload = Vec::new();
    stream
        .take(MAX_RESPONSE_LENGTH as u64)
        .read_to_end(&mut payload)
        .await?;

    Ok(Some(Response { payload, latency }))
}
