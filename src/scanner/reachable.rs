//! Appends reachable addresses to a file during connect-only sweeps.
use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::{self, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::address::Address;

const BACKLOG: usize = 4096;

/// A single writer task fed by every worker. One address per line, no port,
/// so the file can be fed straight back in as an address list.
#[derive(Debug)]
pub struct ReachableLog {
    tx: mpsc::Sender<Address>,
    writer: JoinHandle<io::Result<()>>,
}

impl ReachableLog {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (tx, mut rx) = mpsc::channel::<Address>(BACKLOG);

        let writer = tokio::spawn(async move {
            let mut out = BufWriter::new(file);
            while let Some(addr) = rx.recv().await {
                out.write_all(format!("{addr}\n").as_bytes()).await?;
            }
            out.flush().await
        });

        Ok(Self { tx, writer })
    }

    pub fn sender(&self) -> mpsc::Sender<Address> {
        self.tx.clone()
    }

    /// Waits for every queued line to hit the file. All senders handed out
    /// must already be dropped.
    pub async fn finish(self) -> io::Result<()> {
        drop(self.tx);
        self.writer.await.map_err(io::Error::other)?
    }
}
