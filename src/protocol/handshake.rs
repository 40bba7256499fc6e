//! Game server status handshake over a length-prefixed binary framing.
//!
//! The client sends a handshake packet announcing the "status" state,
//! then an empty status request. The server replies with a single packet
//! `len | id=0 | json_len | json`.
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::varint::{read_varint, write_varint};
use super::{Response, MAX_RESPONSE_LENGTH};
use crate::address::Address;
use crate::errors::ScanError;

const HANDSHAKE_PACKET_ID: u8 = 0x00;
const STATUS_PACKET_ID: u8 = 0x00;
/// Protocol version announced in the handshake; servers answer status
/// requests regardless of the version.
const PROTOCOL_VERSION: u64 = 255;
/// Port field of the handshake, sent as two raw bytes.
const HANDSHAKE_PORT: [u8; 2] = [0xFF, 0x41];
const NEXT_STATE_STATUS: u8 = 0x01;
const STATUS_REQUEST: [u8; 2] = [0x01, STATUS_PACKET_ID];

/// Builds `len | 0x00 | version | host_len | host | port | state`.
pub fn handshake_packet(host: Address) -> Vec<u8> {
    let host = host.to_string();

    let mut body = vec![HANDSHAKE_PACKET_ID];
    write_varint(&mut body, PROTOCOL_VERSION);
    write_varint(&mut body, host.len() as u64);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&HANDSHAKE_PORT);
    body.push(NEXT_STATE_STATUS);

    let mut packet = Vec::with_capacity(body.len() + 1);
    write_varint(&mut packet, body.len() as u64);
    packet.extend_from_slice(&body);
    packet
}

/// Performs the status exchange and returns the raw JSON status document.
///
/// A non-positive packet or JSON length yields `Ok(None)`. A packet length
/// beyond [`MAX_RESPONSE_LENGTH`] is rejected before anything is allocated;
/// the JSON length is clamped to the same cap.
pub async fn scan<S>(host: Address, stream: &mut S) -> Result<Option<Response>, ScanError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let start = Instant::now();
    stream.write_all(&handshake_packet(host)).await?;
    stream.write_all(&STATUS_REQUEST).await?;

    let packet_len = read_varint(stream).await?;
    let latency = start.elapsed();

    if packet_len <= 0 {
        return Ok(None);
    }
    if packet_len.unsigned_abs() > MAX_RESPONSE_LENGTH as u64 {
        return Err(ScanError::MaximumResponseLength {
            declared: packet_len.unsigned_abs(),
            limit: MAX_RESPONSE_LENGTH,
        });
    }

    let packet_id = stream.read_u8().await?;
    if packet_id != STATUS_PACKET_ID {
        return Err(ScanError::UnexpectedPacketId(packet_id));
    }

    let json_len = read_varint(stream).await?;
    if json_len <= 0 {
        return Ok(None);
    }
    let json_len = usize::try_from(json_len)
        .unwrap_or(MAX_RESPONSE_LENGTH)
        .min(MAX_RESPONSE_LENGTH);

    let mut payload = vec![0u8; json_len];
    stream.read_exact(&mut payload).await?;

    Ok(Some(Response { payload, latency }))
}

#[cfg(test)]
mod tests {
    use super::{handshake_packet, scan, STATUS_REQUEST};
    use crate::address::Address;
    use crate::errors::ScanError;
    use crate::protocol::varint::write_varint;
    use crate::protocol::{Response, MAX_RESPONSE_LENGTH};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    const HOST: Address = Address::from_octets(51, 77, 1, 2);
    const STATUS: &str = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"max":20,"online":3},"description":"hi"}"#;

    fn status_packet(packet_id: u8, json: &[u8]) -> Vec<u8> {
        let mut body = vec![packet_id];
        write_varint(&mut body, json.len() as u64);
        body.extend_from_slice(json);

        let mut packet = Vec::new();
        write_varint(&mut packet, body.len() as u64);
        packet.extend_from_slice(&body);
        packet
    }

    async fn exchange(reply: Vec<u8>) -> (Result<Option<Response>, ScanError>, Vec<u8>) {
        let (mut client, mut server) = duplex(MAX_RESPONSE_LENGTH * 2);
        let expected = handshake_packet(HOST).len() + STATUS_REQUEST.len();
        let peer = tokio::spawn(async move {
            let mut request = vec![0u8; expected];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(&reply).await.unwrap();
            request
        });

        let outcome = scan(HOST, &mut client).await;
        (outcome, peer.await.unwrap())
    }

    #[test]
    fn handshake_layout() {
        let packet = handshake_packet(HOST);
        let host = b"51.77.1.2";
        assert_eq!(usize::from(packet[0]), packet.len() - 1);
        assert_eq!(&packet[1..4], &[0x00, 0xFF, 0x01]);
        assert_eq!(usize::from(packet[4]), host.len());
        assert_eq!(&packet[5..5 + host.len()], host);
        assert_eq!(&packet[5 + host.len()..], &[0xFF, 0x41, 0x01]);
    }

    #[tokio::test]
    async fn returns_status_document() {
        let (outcome, request) = exchange(status_packet(0, STATUS.as_bytes())).await;
        let response = outcome.unwrap().unwrap();
        assert_eq!(response.payload, STATUS.as_bytes());
        assert!(request.ends_with(&STATUS_REQUEST));
    }

    #[tokio::test]
    async fn wrong_packet_id_is_protocol_error() {
        let (outcome, _) = exchange(status_packet(1, STATUS.as_bytes())).await;
        assert!(matches!(outcome, Err(ScanError::UnexpectedPacketId(1))));
    }

    #[tokio::test]
    async fn zero_length_is_filtered() {
        let (outcome, _) = exchange(vec![0x00]).await;
        assert!(outcome.unwrap().is_none());

        let (outcome, _) = exchange(status_packet(0, b"")).await;
        assert!(outcome.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_packet_length_is_rejected() {
        let mut reply = Vec::new();
        write_varint(&mut reply, 1 << 30);
        let (outcome, _) = exchange(reply).await;
        assert!(matches!(
            outcome,
            Err(ScanError::MaximumResponseLength { declared, .. }) if declared == 1 << 30
        ));
    }

    #[tokio::test]
    async fn oversized_json_length_is_clamped() {
        let json = vec![b' '; MAX_RESPONSE_LENGTH + 10];
        let mut body = vec![0u8];
        write_varint(&mut body, json.len() as u64);
        body.extend_from_slice(&json);
        let mut reply = Vec::new();
        write_varint(&mut reply, 16);
        reply.extend_from_slice(&body);

        let (outcome, _) = exchange(reply).await;
        assert_eq!(outcome.unwrap().unwrap().payload.len(), MAX_RESPONSE_LENGTH);
    }

    #[tokio::test]
    async fn runaway_varint_is_rejected() {
        let (outcome, _) = exchange(vec![0xFF; 12]).await;
        assert!(matches!(outcome, Err(ScanError::VarIntTooLarge)));
    }
}
