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

// Delivery behaviour around the cooldown: direct publishing while healthy, straight to the outbox
// once no publish has been confirmed for a whole cooldown period.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MemoryOutbox, ScriptedPublisher, sample, test_gateway};
use gateway::delivery::{DeliveryOutcome, PublishOutcome};
use gateway::message::compose;
use gateway::modem::ModemSnapshot;
use gateway::outbox::{OutboxStore, SqliteOutbox};

const COOLDOWN: Duration = Duration::from_secs(300);

#[tokio::test]
async fn test_confirmed_publish_never_stores() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let outbox = MemoryOutbox::new();
    let gateway = test_gateway(publisher.clone(), outbox.clone(), COOLDOWN);

    for tag in ["A", "B", "C"] {
        assert_eq!(
            gateway.context.handle_tag(tag).await,
            DeliveryOutcome::Published
        );
    }

    assert_eq!(publisher.attempt_count(), 3);
    assert_eq!(outbox.len(), 0);
    assert_eq!(gateway.context.coordinator.stats().published, 3);
}

#[tokio::test]
async fn test_unconfirmed_publish_is_not_stored() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Unconfirmed);
    let outbox = MemoryOutbox::new();
    let gateway = test_gateway(publisher.clone(), outbox.clone(), COOLDOWN);

    assert_eq!(
        gateway.context.handle_tag("A").await,
        DeliveryOutcome::QueuedUnconfirmed
    );
    assert_eq!(publisher.attempt_count(), 1);
    assert_eq!(outbox.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_publish_rearms_cooldown() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let outbox = MemoryOutbox::new();
    let gateway = test_gateway(publisher.clone(), outbox.clone(), COOLDOWN);

    tokio::time::advance(Duration::from_secs(240)).await;
    gateway.context.handle_tag("A").await;

    // 480s after start, but only 240s after the last confirmation.
    tokio::time::advance(Duration::from_secs(240)).await;
    assert!(!gateway.cooldown.is_elapsed());
    assert_eq!(
        gateway.context.handle_tag("B").await,
        DeliveryOutcome::Published
    );
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_publishes_let_cooldown_elapse() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Unconfirmed);
    let outbox = MemoryOutbox::new();
    let gateway = test_gateway(publisher.clone(), outbox.clone(), COOLDOWN);

    gateway.context.handle_tag("A").await;
    tokio::time::advance(COOLDOWN).await;

    assert!(matches!(
        gateway.context.handle_tag("B").await,
        DeliveryOutcome::Stored(_)
    ));
    assert_eq!(publisher.attempt_count(), 1);
    assert_eq!(outbox.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_after_cooldown_each_trigger_stores_one_record() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let outbox = MemoryOutbox::new();
    let gateway = test_gateway(publisher.clone(), outbox.clone(), COOLDOWN);
    gateway.context.fixes.ingest(sample(1, "10:00:00"));

    tokio::time::advance(COOLDOWN + Duration::from_secs(1)).await;
    let first = gateway.context.handle_tag("TAG1").await;
    tokio::time::advance(Duration::from_secs(1)).await;
    let second = gateway.context.handle_tag("TAG2").await;

    assert!(matches!(first, DeliveryOutcome::Stored(_)));
    assert!(matches!(second, DeliveryOutcome::Stored(_)));
    assert_ne!(first, second);
    assert_eq!(publisher.attempt_count(), 0);

    // Storing doesn't re-arm the cooldown.
    assert!(gateway.cooldown.is_elapsed());

    let stored = outbox.messages();
    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored[0],
        compose(
            "TAG1",
            Some(sample(1, "10:00:00")),
            ModemSnapshot::default()
        )
    );
    assert_eq!(stored[1].rfid, "TAG2");
    assert_eq!(gateway.context.coordinator.stats().stored, 2);
}

#[tokio::test]
async fn test_stored_record_matches_composed_message() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let outbox = Arc::new(SqliteOutbox::connect("sqlite::memory:").await.unwrap());
    let gateway = test_gateway(publisher.clone(), outbox.clone(), Duration::ZERO);

    let mut fix = sample(2, "11:30:00");
    fix.course = Some("SW".to_string());
    gateway.context.fixes.ingest(fix.clone());

    let DeliveryOutcome::Stored(id) = gateway.context.handle_tag("RFID-7").await else {
        panic!("message was not stored");
    };

    let pending = outbox.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(
        pending[0].message,
        compose("RFID-7", Some(fix), ModemSnapshot::default())
    );
    assert_eq!(publisher.attempt_count(), 0);
}

#[tokio::test]
async fn test_storage_failure_loses_message() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let outbox = Arc::new(SqliteOutbox::connect("sqlite::memory:").await.unwrap());
    outbox.pool().close().await;
    let gateway = test_gateway(publisher.clone(), outbox, Duration::ZERO);

    assert_eq!(
        gateway.context.handle_tag("A").await,
        DeliveryOutcome::Lost
    );
    assert_eq!(gateway.context.coordinator.stats().lost, 1);
    assert_eq!(publisher.attempt_count(), 0);
}

#[tokio::test]
async fn test_message_before_first_fix_has_no_fix() {
    let publisher = ScriptedPublisher::always(PublishOutcome::Confirmed);
    let gateway = test_gateway(publisher.clone(), MemoryOutbox::new(), COOLDOWN);

    gateway.context.fixes.ingest(sample(0, "ignored"));
    gateway.context.handle_tag("A").await;

    let attempts = publisher.attempts();
    assert_eq!(attempts[0].gps.fix, 0);
    assert_eq!(attempts[0].gps.time, "");
}
