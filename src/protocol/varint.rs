//! Variable-length integers: seven bits per byte, least significant group
//! first, high bit set while more bytes follow.
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::ScanError;

/// Reads one varint. Fails with [`ScanError::VarIntTooLarge`] once the
/// shift would reach 64 bits, so at most ten bytes are consumed.
#[allow(clippy::cast_possible_wrap)]
pub async fn read_varint<R>(reader: &mut R) -> Result<i64, ScanError>
where
    R: AsyncRead + Unpin,
{
    let mut result: u64 = 0;
    let mut position: u32 = 0;

    loop {
        let byte = reader.read_u8().await?;
        result |= u64::from(byte & 0x7F) << position;
        if byte & 0x80 == 0 {
            break;
        }

        position += 7;
        if position >= 64 {
            return Err(ScanError::VarIntTooLarge);
        }
    }

    Ok(result as i64)
}

pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}
