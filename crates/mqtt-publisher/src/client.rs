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

// src/client.rs
// MqttPublisher publishes payloads to a single topic family and reports,
// per publish, whether the broker acknowledged it within a bounded wait.
//
// The rumqttc event loop runs in its own task: it keeps the connection
// alive, reconnects after errors, and feeds every event into the
// AckTracker so waiting publishers are woken up.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::acks::AckTracker;
use crate::errors::PublisherError;
use crate::options::PublisherOptions;
use crate::stats::{PublishStats, PublishStatsTracker};

// How long the event loop gets to flush a DISCONNECT on shutdown.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

// AckStatus is the result of a publish that made it to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    // Confirmed means the broker acknowledged the publish in time.
    Confirmed,
    // TimedOut means no acknowledgement arrived within the bounded
    // wait. The request stays with the client, which keeps retrying it
    // internally while the session lives.
    TimedOut,
}

pub struct MqttPublisher {
    client: AsyncClient,
    tracker: Arc<Mutex<AckTracker>>,
    stats: Arc<PublishStatsTracker>,
    qos: QoS,
    retain: bool,
    ack_timeout: Duration,
}

impl MqttPublisher {
    /// Create a publisher for the broker at `host:port` and spawn its event loop. Nothing is
    /// connected until the event loop polls for the first time, so the only failure is an empty
    /// `client_id`; connection errors show up in the logs and in
    /// [`PublishStats::total_event_loop_errors`].
    pub fn connect(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        options: PublisherOptions,
    ) -> Result<(Arc<Self>, EventLoopHandle), PublisherError> {
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(PublisherError::EmptyClientId);
        }

        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(options.effective_keep_alive());
        // Keep the session across reconnects so unacknowledged QoS 1/2
        // publishes are resent instead of dropped.
        mqtt_options.set_clean_session(false);
        if let Some(credentials) = &options.credentials {
            mqtt_options.set_credentials(
                credentials.username.clone(),
                credentials.password.clone(),
            );
        }

        let (client, event_loop) =
            AsyncClient::new(mqtt_options, options.effective_channel_capacity());
        let tracker = Arc::new(Mutex::new(AckTracker::new()));
        let stats = Arc::new(PublishStatsTracker::new());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(run_event_loop(
            event_loop,
            client.clone(),
            tracker.clone(),
            stats.clone(),
            options.effective_reconnect_delay(),
            shutdown_rx,
        ));

        let publisher = Arc::new(Self {
            client,
            tracker,
            stats,
            qos: options.effective_qos(),
            retain: options.effective_retain(),
            ack_timeout: options.effective_ack_timeout(),
        });

        Ok((
            publisher,
            EventLoopHandle {
                shutdown_tx,
                join_handle,
            },
        ))
    }

    /// Publish `payload` to `topic` and wait up to the configured ack timeout for the broker to
    /// acknowledge it.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<AckStatus, PublisherError> {
        let payload_size = payload.len();

        let ack_rx = {
            let mut tracker = lock_tracker(&self.tracker);
            let ack_rx = tracker.register(self.qos);
            if let Err(error) = self
                .client
                .try_publish(topic, self.qos, self.retain, payload)
            {
                tracker.unregister_last();
                self.stats.increment_rejected();
                return Err(error.into());
            }
            ack_rx
        };

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(())) => {
                self.stats.increment_confirmed(payload_size);
                tracing::debug!(topic, payload_size, "publish acknowledged");
                Ok(AckStatus::Confirmed)
            }
            Ok(Err(_)) => Err(PublisherError::EventLoopClosed),
            Err(_) => {
                self.stats.increment_timed_out();
                tracing::warn!(
                    topic,
                    timeout = ?self.ack_timeout,
                    "publish not acknowledged in time, left queued in client"
                );
                Ok(AckStatus::TimedOut)
            }
        }
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.stats.to_stats()
    }
}

fn lock_tracker(tracker: &Mutex<AckTracker>) -> MutexGuard<'_, AckTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    tracker: Arc<Mutex<AckTracker>>,
    stats: Arc<PublishStatsTracker>,
    reconnect_delay: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(error) = client.try_disconnect() {
                    tracing::debug!(%error, "could not queue MQTT disconnect");
                } else {
                    let _ = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, event_loop.poll()).await;
                }
                tracing::info!("MQTT event loop shutting down");
                break;
            }

            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    tracing::info!(code = ?connack.code, "connected to MQTT broker");
                }
                Ok(event) => {
                    lock_tracker(&tracker).handle_event(&event);
                }
                Err(error) => {
                    stats.increment_event_loop_errors();
                    tracing::warn!(
                        %error,
                        retry_in = ?reconnect_delay,
                        "MQTT connection error"
                    );
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(reconnect_delay) => {}
                    }
                }
            }
        }
    }
}

pub struct EventLoopHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl EventLoopHandle {
    pub fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<()>) {
        (self.shutdown_tx, self.join_handle)
    }

    /// Stop the event loop, sending a DISCONNECT if the connection is up.
    pub async fn shutdown_and_wait(self) {
        let (shutdown_tx, join_handle) = self.into_parts();
        let _ = shutdown_tx.send(());
        if let Err(error) = join_handle.await {
            tracing::error!(%error, "MQTT event loop task failed");
        }
    }
}
