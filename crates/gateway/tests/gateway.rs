/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

// Whole-gateway runs with the broker and the device endpoints unreachable.

use std::time::Duration;

use gateway::config::Config;
use gateway::outbox::{OutboxStore, SqliteOutbox};
use gateway::shutdown_handle::ShutdownHandle;
use gateway::trigger_server::send_tag;

fn offline_config(database_url: String) -> Config {
    let mut config = Config::default();
    config.listen_address = "127.0.0.1:0".parse().unwrap();
    config.broker.host = "127.0.0.1".to_string();
    config.broker.port = 1;
    config.broker.ack_timeout = Duration::from_millis(200);
    config.broker.reconnect_delay = Duration::from_millis(100);
    config.outbox.database_url = database_url;
    config.outbox.sweep_interval = Duration::from_secs(3600);
    config.location_feed.url = "ws://127.0.0.1:9".to_string();
    config.location_feed.reconnect_interval = Duration::from_secs(3600);
    config.modem.status_url = "http://127.0.0.1:9/details".to_string();
    config
}

async fn wait_for_pending(outbox: &SqliteOutbox, count: usize) -> usize {
    let mut pending = 0;
    for _ in 0..200 {
        pending = outbox.pending().await.unwrap().len();
        if pending >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    pending
}

#[tokio::test]
async fn test_tags_are_stored_once_cooldown_has_elapsed() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("outbox.db").display());

    let mut config = offline_config(database_url.clone());
    config.delivery.cooldown = Duration::ZERO;
    let handle = gateway::spawn(config).await.unwrap();

    send_tag(handle.local_addr(), "TAG123", false).await.unwrap();
    send_tag(handle.local_addr(), "TAG456", false).await.unwrap();

    let reader = SqliteOutbox::connect(&database_url).await.unwrap();
    assert_eq!(wait_for_pending(&reader, 2).await, 2);
    assert_eq!(handle.shutdown_and_wait().await, Some(()));

    let mut tags: Vec<_> = reader
        .pending()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.message.rfid)
        .collect();
    tags.sort();
    assert_eq!(tags, ["TAG123", "TAG456"]);
}

#[tokio::test]
async fn test_unconfirmed_tags_are_not_stored_during_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("outbox.db").display());

    let handle = gateway::spawn(offline_config(database_url.clone()))
        .await
        .unwrap();
    send_tag(handle.local_addr(), "TAG123", false).await.unwrap();

    // Longer than the acknowledgement wait.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.shutdown_and_wait().await, Some(()));

    let reader = SqliteOutbox::connect(&database_url).await.unwrap();
    assert!(reader.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let mut config = offline_config("sqlite::memory:".to_string());
    config.broker.qos = 3;
    assert!(matches!(
        gateway::spawn(config).await,
        Err(gateway::SpawnError::Config(_))
    ));
}

#[tokio::test]
async fn test_empty_client_id_is_rejected() {
    let mut config = offline_config("sqlite::memory:".to_string());
    config.broker.client_id = String::new();
    assert!(matches!(
        gateway::spawn(config).await,
        Err(gateway::SpawnError::Config(
            gateway::config::ConfigError::EmptyClientId
        ))
    ));
}
