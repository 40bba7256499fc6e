//! Application probes spoken once a connection is up.
//!
//! [`Protocol`] is a closed set: each variant knows its port, its transport,
//! how to run its exchange ([`Protocol::scan`]) and how to turn the raw
//! reply into a stored record ([`Protocol::save`]).
pub mod discovery;
pub mod handshake;
pub mod http;
pub mod varint;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;
use serde_derive::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;

use crate::address::Address;
use crate::errors::{SaveError, ScanError};
use crate::sink::{Record, Sink};
use discovery::ServerInfo;

/// Upper bound on any payload read from a remote peer.
pub const MAX_RESPONSE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stream,
    Datagram,
}

/// What a probe produced: the raw payload and the time between the first
/// protocol write and the first meaningful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: Vec<u8>,
    pub latency: Duration,
}

impl Response {
    #[must_use]
    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX)
    }
}

/// An established connection to a target. Dropping it closes the socket.
#[derive(Debug)]
pub enum Connection {
    Stream(TcpStream),
    Datagram(UdpSocket),
}

impl Connection {
    /// Connects over `transport` within `timeout`.
    ///
    /// A datagram "connection" only binds an ephemeral port and fixes the
    /// peer; it cannot fail for an unreachable host.
    pub async fn dial(
        transport: Transport,
        target: SocketAddr,
        timeout: Duration,
    ) -> io::Result<Self> {
        let connect = async move {
            match transport {
                Transport::Stream => TcpStream::connect(target).await.map(Self::Stream),
                Transport::Datagram => {
                    let socket = UdpSocket::bind(unspecified_for(target)).await?;
                    socket.connect(target).await?;
                    Ok(Self::Datagram(socket))
                }
            }
        };

        time::timeout(timeout, connect)
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?
    }

    /// Best-effort orderly shutdown of a stream.
    pub async fn close(self) {
        if let Self::Stream(mut stream) = self {
            let _ = stream.shutdown().await;
        }
    }
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

/// The probe a run speaks.
///   - http sends `GET /` and keeps 2xx bodies.
///   - minecraft runs the length-prefixed status handshake.
///   - veloren runs the two-phase UDP discovery exchange.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[value(name = "minecraft")]
    #[serde(rename = "minecraft")]
    Handshake,
    #[value(name = "veloren")]
    #[serde(rename = "veloren")]
    Discovery,
}

impl Protocol {
    /// Scanner name, also the sink collection name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Handshake => "minecraft",
            Self::Discovery => "veloren",
        }
    }

    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Handshake => 25565,
            Self::Discovery => 14006,
        }
    }

    #[must_use]
    pub const fn transport(self) -> Transport {
        match self {
            Self::Http | Self::Handshake => Transport::Stream,
            Self::Discovery => Transport::Datagram,
        }
    }

    /// Runs the exchange on an open connection.
    ///
    /// `Ok(None)` means the target answered but is not interesting (a
    /// non-2xx status, a zero length prefix); it is not an error.
    pub async fn scan(
        self,
        target: Address,
        conn: &mut Connection,
    ) -> Result<Option<Response>, ScanError> {
        match (self, conn) {
            (Self::Http, Connection::Stream(stream)) => http::scan(target, stream).await,
            (Self::Handshake, Connection::Stream(stream)) => {
                handshake::scan(target, stream).await
            }
            (Self::Discovery, Connection::Datagram(socket)) => discovery::scan(socket).await,
            _ => Err(ScanError::TransportMismatch),
        }
    }

    /// Decodes a payload into the document stored for this protocol.
    ///
    /// Status documents must be valid JSON; a malformed one is reported
    /// rather than stored as text.
    pub fn decode(self, payload: &[u8]) -> Result<Value, SaveError> {
        match self {
            Self::Http => Ok(Value::String(String::from_utf8_lossy(payload).into_owned())),
            Self::Handshake => {
                serde_json::from_slice(payload).map_err(|e| SaveError::Decode(e.to_string()))
            }
            Self::Discovery => serde_json::to_value(ServerInfo::decode(payload)?)
                .map_err(|e| SaveError::Decode(e.to_string())),
        }
    }

    /// Decodes the payload and upserts it under the target's address.
    pub async fn save(
        self,
        target: Address,
        response: &Response,
        sink: &dyn Sink,
    ) -> Result<(), SaveError> {
        let data = self.decode(&response.payload)?;
        let record = Record::new(target, response.latency_ms(), data);
        sink.upsert(&record).await?;
        Ok(())
    }
}
