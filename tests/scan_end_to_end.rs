//! Drives whole sweeps through the public API against loopback servers and
//! checks what lands in the file-backed sink.
use std::time::Duration;

use rangescan::address::Address;
use rangescan::address_strategy::{parse_address_list, AddressStrategy};
use rangescan::protocol::varint::write_varint;
use rangescan::protocol::Protocol;
use rangescan::scanner::{Phase, ScanSettings, Scanner};
use rangescan::sink::{read_record, FileStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const LOCALHOST: Address = Address::from_octets(127, 0, 0, 1);
const STATUS: &str = r#"{"version":{"name":"1.21","protocol":767},"players":{"max":50,"online":7}}"#;

fn status_reply(json: &str) -> Vec<u8> {
    let mut body = vec![0x00];
    write_varint(&mut body, json.len() as u64);
    body.extend_from_slice(json.as_bytes());

    let mut packet = Vec::new();
    write_varint(&mut packet, body.len() as u64);
    packet.extend_from_slice(&body);
    packet
}

async fn status_server(reply: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(&reply).await;
            });
        }
    });
    port
}

fn settings(protocol: Protocol, port: u16) -> ScanSettings {
    ScanSettings {
        protocol,
        port: Some(port),
        workers: 2,
        tasks_per_worker: 8,
        scan_timeout: Duration::from_secs(1),
        ..ScanSettings::default()
    }
}

#[tokio::test]
async fn handshake_status_is_stored_as_json() {
    let port = status_server(status_reply(STATUS)).await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    let scanner = Scanner::new(settings(Protocol::Handshake, port));
    let summary = scanner
        .run_with([LOCALHOST], &store, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    let record = read_record(&store.collection_dir("minecraft"), "127.0.0.1")
        .await
        .unwrap();
    assert_eq!(record.key, "127.0.0.1");
    assert_eq!(record.data["players"]["online"], 7);
}

#[tokio::test]
async fn rescanning_replaces_the_record() {
    let port = status_server(status_reply(STATUS)).await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let scanner = Scanner::new(settings(Protocol::Handshake, port));

    let summary = scanner
        .run_with(vec![LOCALHOST; 6], &store, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 6);

    let entries: Vec<_> = std::fs::read_dir(store.collection_dir("minecraft"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("127.0.0.1.json")]);
}

#[tokio::test]
async fn malformed_status_is_not_stored() {
    let port = status_server(status_reply("{not json")).await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    let scanner = Scanner::new(settings(Protocol::Handshake, port));
    let summary = scanner
        .run_with([LOCALHOST], &store, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert!(
        read_record(&store.collection_dir("minecraft"), "127.0.0.1")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn reserved_entries_are_dropped_from_address_lists() {
    let list = parse_address_list("127.0.0.1\n10.1.2.3\n# comment\n\n192.168.0.9\n").unwrap();
    let strategy = AddressStrategy::pick(Address::DEFAULT_START, Some(list));

    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::new(settings(Protocol::Http, 1));
    let summary = scanner
        .run(strategy, &FileStore::new(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.exhausted);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.last_reached, None);
    assert_eq!(*scanner.subscribe().borrow(), Phase::Stopped);
}

#[tokio::test]
async fn cancelled_sweep_reports_resume_point() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::new(ScanSettings {
        workers: 1,
        tasks_per_worker: 2,
        connect_timeout: Duration::from_millis(50),
        scan_timeout: Duration::from_millis(50),
        ..settings(Protocol::Http, 1)
    });
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let start: Address = "45.33.32.156".parse().unwrap();
    let summary = scanner
        .run(
            AddressStrategy::pick(start, None),
            &FileStore::new(dir.path()),
            shutdown,
        )
        .await
        .unwrap();

    assert!(!summary.exhausted);
    assert_eq!(summary.last_reached, Some(start));
    assert_eq!(summary.dispatched, 0);
}
