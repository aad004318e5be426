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

//! Publishing composed messages, with the cooldown that diverts them to the outbox while the
//! broker looks unhealthy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mqtt_publisher::{AckStatus, MqttPublisher, PublishStats};
use tokio::time::Instant;

use crate::message::OutboundMessage;
use crate::outbox::OutboxStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker acknowledged the message within the bounded wait.
    Confirmed,
    /// No acknowledgement in time, or the client refused the request.
    Unconfirmed,
}

#[async_trait::async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> PublishOutcome;
}

/// Publishes to a fixed topic through the MQTT client.
pub struct MqttBrokerPublisher {
    publisher: Arc<MqttPublisher>,
    topic: String,
}

impl MqttBrokerPublisher {
    pub fn new(publisher: Arc<MqttPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.publisher.publish_stats()
    }
}

#[async_trait::async_trait]
impl BrokerPublisher for MqttBrokerPublisher {
    async fn publish(&self, payload: Vec<u8>) -> PublishOutcome {
        match self.publisher.publish(&self.topic, payload).await {
            Ok(AckStatus::Confirmed) => PublishOutcome::Confirmed,
            Ok(AckStatus::TimedOut) => PublishOutcome::Unconfirmed,
            Err(error) => {
                tracing::warn!(
                    %error,
                    backpressure = error.is_backpressure(),
                    topic = %self.topic,
                    "publish rejected by MQTT client"
                );
                PublishOutcome::Unconfirmed
            }
        }
    }
}

/// Elapses when `period` passes without a [`CooldownTimer::reset`]. Once elapsed it stays elapsed
/// until the next reset.
pub struct CooldownTimer {
    period: Duration,
    deadline: Mutex<Instant>,
}

impl CooldownTimer {
    /// A timer armed for `period` from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: Mutex::new(Instant::now() + period),
        }
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= *self.lock()
    }

    pub fn reset(&self) {
        *self.lock() = Instant::now() + self.period;
    }

    pub fn remaining(&self) -> Duration {
        self.lock().saturating_duration_since(Instant::now())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Published and confirmed. Nothing was stored.
    Published,
    /// Handed to the MQTT client but not confirmed in time. The client keeps retrying it, nothing
    /// was stored.
    QueuedUnconfirmed,
    /// The cooldown had elapsed, so the message went to the outbox with this id.
    Stored(i64),
    /// The message could be neither published nor stored.
    Lost,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    pub published: usize,
    pub queued_unconfirmed: usize,
    pub stored: usize,
    pub lost: usize,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    published: AtomicUsize,
    queued_unconfirmed: AtomicUsize,
    stored: AtomicUsize,
    lost: AtomicUsize,
}

impl DeliveryCounters {
    fn record(&self, outcome: DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Published => &self.published,
            DeliveryOutcome::QueuedUnconfirmed => &self.queued_unconfirmed,
            DeliveryOutcome::Stored(_) => &self.stored,
            DeliveryOutcome::Lost => &self.lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_stats(&self) -> DeliveryStats {
        DeliveryStats {
            published: self.published.load(Ordering::Relaxed),
            queued_unconfirmed: self.queued_unconfirmed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}

pub struct DeliveryCoordinator {
    publisher: Arc<dyn BrokerPublisher>,
    outbox: Arc<dyn OutboxStore>,
    cooldown: Arc<CooldownTimer>,
    counters: DeliveryCounters,
}

impl DeliveryCoordinator {
    pub fn new(
        publisher: Arc<dyn BrokerPublisher>,
        outbox: Arc<dyn OutboxStore>,
        cooldown: Arc<CooldownTimer>,
    ) -> Self {
        Self {
            publisher,
            outbox,
            cooldown,
            counters: DeliveryCounters::default(),
        }
    }

    /// Deliver one message. While the cooldown hasn't elapsed the message is published and a
    /// confirmation re-arms the cooldown. Once it has elapsed, messages go straight to the outbox
    /// without a publish attempt.
    pub async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let outcome = if self.cooldown.is_elapsed() {
            self.store(message).await
        } else {
            self.publish(message).await
        };
        self.counters.record(outcome);
        outcome
    }

    async fn store(&self, message: &OutboundMessage) -> DeliveryOutcome {
        match self.outbox.insert(message).await {
            Ok(id) => {
                tracing::info!(id, tag = %message.rfid, "no confirmed publish within cooldown, message stored");
                DeliveryOutcome::Stored(id)
            }
            Err(error) => {
                tracing::error!(%error, tag = %message.rfid, "could not store message, it is lost");
                DeliveryOutcome::Lost
            }
        }
    }

    async fn publish(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, tag = %message.rfid, "could not encode message");
                return DeliveryOutcome::Lost;
            }
        };

        match self.publisher.publish(payload).await {
            PublishOutcome::Confirmed => {
                self.cooldown.reset();
                tracing::debug!(tag = %message.rfid, "message published");
                DeliveryOutcome::Published
            }
            PublishOutcome::Unconfirmed => {
                tracing::warn!(
                    tag = %message.rfid,
                    cooldown_remaining = ?self.cooldown.remaining(),
                    "message not confirmed, left queued in the MQTT client"
                );
                DeliveryOutcome::QueuedUnconfirmed
            }
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.to_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_elapses_and_stays_elapsed() {
        let cooldown = CooldownTimer::new(Duration::from_secs(300));
        assert!(!cooldown.is_elapsed());
        assert_eq!(cooldown.remaining(), Duration::from_secs(300));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!cooldown.is_elapsed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cooldown.is_elapsed());
        assert_eq!(cooldown.remaining(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(cooldown.is_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_reset_rearms() {
        let cooldown = CooldownTimer::new(Duration::from_secs(300));
        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(cooldown.is_elapsed());

        cooldown.reset();
        assert!(!cooldown.is_elapsed());
        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(!cooldown.is_elapsed());
    }

    #[test]
    fn test_counters_track_outcomes() {
        let counters = DeliveryCounters::default();
        counters.record(DeliveryOutcome::Published);
        counters.record(DeliveryOutcome::Published);
        counters.record(DeliveryOutcome::Stored(4));
        counters.record(DeliveryOutcome::Lost);

        assert_eq!(
            counters.to_stats(),
            DeliveryStats {
                published: 2,
                queued_unconfirmed: 0,
                stored: 1,
                lost: 1,
            }
        );
    }
}
