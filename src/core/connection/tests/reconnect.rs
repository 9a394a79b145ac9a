use std::time::Duration;

use super::{BASE, assert_gap, manager, wait_for};
use crate::core::connection::ConnectionStatus;
use crate::core::connection::memory::MemoryConnector;

#[tokio::test(start_paused = true)]
async fn five_failures_back_off_geometrically_then_connect() {
    let connector = MemoryConnector::new();
    connector.refuse_times(5, "connection refused");
    let _peer = connector.accept_next();
    let manager = manager(&connector, 10);
    let mut status = manager.watch_status();

    manager.connect();
    let mut seen = Vec::new();
    loop {
        status.changed().await.unwrap();
        let snapshot = status.borrow_and_update().clone();
        seen.push(snapshot.status);
        if snapshot.status == ConnectionStatus::Connected {
            assert_eq!(snapshot.reconnect_attempts, 0);
            assert_eq!(snapshot.last_error, None);
            break;
        }
    }
    assert!(!seen.contains(&ConnectionStatus::Error));

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 6);
    let expected = [1u32, 2, 4, 8, 16];
    for (pair, factor) in attempts.windows(2).zip(expected) {
        assert_gap(pair[1].at - pair[0].at, BASE * factor);
    }
}

#[tokio::test(start_paused = true)]
async fn failure_past_the_ceiling_ends_in_error() {
    let connector = MemoryConnector::new();
    let manager = manager(&connector, 10);
    let mut status = manager.watch_status();

    manager.connect();
    let snapshot = wait_for(&mut status, ConnectionStatus::Error).await;
    assert_eq!(connector.attempt_count(), 11);
    assert_eq!(snapshot.reconnect_attempts, 10);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("connection lost, manual action required")
    );

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
    assert_eq!(connector.attempt_count(), 11);
    assert_eq!(manager.status().status, ConnectionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_after_error_starts_a_fresh_budget() {
    let connector = MemoryConnector::new();
    let manager = manager(&connector, 2);
    let mut status = manager.watch_status();

    manager.connect();
    wait_for(&mut status, ConnectionStatus::Error).await;
    assert_eq!(connector.attempt_count(), 3);

    let _peer = connector.accept_next();
    manager.connect();
    let snapshot = wait_for(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(connector.attempt_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_after_base_delay() {
    let connector = MemoryConnector::new();
    let first = connector.accept_next();
    let _second = connector.accept_next();
    let manager = manager(&connector, 10);
    let mut status = manager.watch_status();

    manager.connect();
    wait_for(&mut status, ConnectionStatus::Connected).await;
    first.close_with(1011);

    let reconnecting = wait_for(&mut status, ConnectionStatus::Connecting).await;
    assert_eq!(reconnecting.reconnect_attempts, 1);
    assert!(reconnecting.last_error.unwrap().contains("1011"));

    let snapshot = wait_for(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(snapshot.reconnect_attempts, 0);
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert_gap(attempts[1].at - attempts[0].at, BASE);
}

#[tokio::test(start_paused = true)]
async fn stream_end_without_close_frame_is_abnormal() {
    let connector = MemoryConnector::new();
    let mut first = connector.accept_next();
    let _second = connector.accept_next();
    let manager = manager(&connector, 10);
    let mut status = manager.watch_status();

    manager.connect();
    wait_for(&mut status, ConnectionStatus::Connected).await;
    first.drop_connection();

    wait_for(&mut status, ConnectionStatus::Connecting).await;
    wait_for(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn normal_close_disconnects_without_retry() {
    let connector = MemoryConnector::new();
    let peer = connector.accept_next();
    let manager = manager(&connector, 10);
    let mut status = manager.watch_status();

    manager.connect();
    wait_for(&mut status, ConnectionStatus::Connected).await;
    peer.close_with(1000);

    let snapshot = wait_for(&mut status, ConnectionStatus::Disconnected).await;
    assert_eq!(snapshot.last_error, None);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempt_count(), 1);
}
