//! This crate exposes the internal functionality of the `rangescan`
//! Internet-range scanner.
//!
//! rangescan walks the public IPv4 space in increasing order, skipping
//! reserved and private blocks, and runs an application-level probe against
//! every address. Hosts that answer are upserted into a persistence sink
//! keyed by their address, so repeated sweeps keep one record per host.
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner) which in turn requires an
//! [`AddressStrategy`](crate::address_strategy::AddressStrategy) and a
//! [`SinkConnector`](crate::sink::SinkConnector). The scanning process
//! follows this flow:
//!
//! 1. **Address Source**: the range iterator (or an address list) yields
//!    candidates, skipping [reserved blocks](crate::reserved)
//! 2. **Dispatch**: addresses go through a bounded queue to a fixed pool of
//!    workers, each with its own concurrency limiter and sink handle
//! 3. **Probe**: every address gets one connection and one
//!    [`Protocol`](crate::protocol::Protocol) exchange under a deadline
//! 4. **Persist**: successful responses are decoded and upserted
//! 5. **Shutdown**: cancellation stops dispatch and drains in-flight work
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use rangescan::address::Address;
//! use rangescan::address_strategy::AddressStrategy;
//! use rangescan::protocol::Protocol;
//! use rangescan::scanner::{ScanSettings, Scanner};
//! use rangescan::sink::FileStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scanner = Scanner::new(ScanSettings {
//!         protocol: Protocol::Handshake,
//!         workers: 4,
//!         tasks_per_worker: 256,
//!         ..ScanSettings::default()
//!     });
//!
//!     let start: Address = "31.0.0.0".parse()?;
//!     let summary = scanner
//!         .run(
//!             AddressStrategy::pick(start, None),
//!             &FileStore::new("results"),
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!
//!     println!("stopped at {:?}", summary.last_reached);
//!     Ok(())
//! }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod address;

pub mod address_strategy;

pub mod errors;

pub mod input;

pub mod protocol;

pub mod reserved;

pub mod scanner;

pub mod sink;

pub mod stats;
