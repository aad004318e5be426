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

// Fakes and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use gateway::config::ModemConfig;
use gateway::context::GatewayContext;
use gateway::credentials::CredentialStore;
use gateway::delivery::{BrokerPublisher, CooldownTimer, DeliveryCoordinator, PublishOutcome};
use gateway::location::{FixTracker, LocationSample};
use gateway::message::OutboundMessage;
use gateway::modem::ModemCache;
use gateway::outbox::{OutboxError, OutboxRecord, OutboxStore};

/// Answers publishes from a script, falling back to `default` once the script runs out.
pub struct ScriptedPublisher {
    script: Mutex<VecDeque<PublishOutcome>>,
    default: PublishOutcome,
    attempts: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedPublisher {
    pub fn always(outcome: PublishOutcome) -> Arc<Self> {
        Self::scripted(Vec::new(), outcome)
    }

    pub fn scripted(script: Vec<PublishOutcome>, default: PublishOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default,
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Every message a publish was attempted for, in order.
    pub fn attempts(&self) -> Vec<OutboundMessage> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl BrokerPublisher for ScriptedPublisher {
    async fn publish(&self, payload: Vec<u8>) -> PublishOutcome {
        let message: OutboundMessage =
            serde_json::from_slice(&payload).expect("publisher got an undecodable payload");
        self.attempts.lock().unwrap().push(message);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}

/// Outbox kept in memory, so tests can run with paused time.
#[derive(Default)]
pub struct MemoryOutbox {
    records: Mutex<BTreeMap<i64, OutboundMessage>>,
    next_id: Mutex<i64>,
}

impl MemoryOutbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl OutboxStore for MemoryOutbox {
    async fn insert(&self, message: &OutboundMessage) -> Result<i64, OutboxError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        self.records
            .lock()
            .unwrap()
            .insert(*next_id, message.clone());
        Ok(*next_id)
    }

    async fn pending(&self) -> Result<Vec<OutboxRecord>, OutboxError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(id, message)| OutboxRecord {
                id: *id,
                message: message.clone(),
                created_at: chrono::Utc::now(),
            })
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, OutboxError> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }
}

pub fn sample(fix: i32, time: &str) -> LocationSample {
    LocationSample {
        altitude: 98.0,
        course: None,
        fix,
        gps_fix_available: fix != 0,
        hdop: 1.1,
        latitude: 45.8,
        longitude: 15.9,
        number_of_satellites: 6,
        speed_knots: 0.0,
        speed_mph: 0.0,
        time: time.to_string(),
    }
}

pub const MODEM_DETAILS: &str = r#"{
    "dataLinkType": "lte",
    "rssi": -67,
    "accessTechnology": "LTE",
    "operatorName": "HT",
    "state": "up"
}"#;

/// Modem cache pointed at `status_url`.
pub fn modem_cache(status_url: String, credentials: CredentialStore) -> Arc<ModemCache> {
    let config = ModemConfig {
        status_url,
        request_timeout: Duration::from_secs(2),
    };
    Arc::new(ModemCache::new(&config, credentials).unwrap())
}

pub struct TestGateway {
    pub context: Arc<GatewayContext>,
    pub cooldown: Arc<CooldownTimer>,
}

/// A gateway context whose modem calls are skipped (no token), delivering through `publisher`
/// into `outbox`.
pub fn test_gateway(
    publisher: Arc<dyn BrokerPublisher>,
    outbox: Arc<dyn OutboxStore>,
    cooldown: Duration,
) -> TestGateway {
    test_gateway_with_modem(
        publisher,
        outbox,
        cooldown,
        modem_cache(
            "http://127.0.0.1:9/unused".to_string(),
            CredentialStore::new(),
        ),
    )
}

pub fn test_gateway_with_modem(
    publisher: Arc<dyn BrokerPublisher>,
    outbox: Arc<dyn OutboxStore>,
    cooldown: Duration,
    modem: Arc<ModemCache>,
) -> TestGateway {
    let cooldown = Arc::new(CooldownTimer::new(cooldown));
    let coordinator = Arc::new(DeliveryCoordinator::new(
        publisher,
        outbox,
        cooldown.clone(),
    ));
    let context = Arc::new(GatewayContext {
        credentials: CredentialStore::new(),
        fixes: Arc::new(FixTracker::new()),
        modem,
        coordinator,
    });
    TestGateway { context, cooldown }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
