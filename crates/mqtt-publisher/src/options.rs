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

// src/options.rs
// Configuration options for the MqttPublisher.
use std::time::Duration;

use rumqttc::QoS;

// DEFAULT_KEEP_ALIVE is used when PublisherOptions doesn't set one.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
// DEFAULT_MESSAGE_CHANNEL_CAPACITY is the number of requests the
// rumqttc request channel buffers before try_publish starts failing.
pub const DEFAULT_MESSAGE_CHANNEL_CAPACITY: usize = 64;
// DEFAULT_ACK_TIMEOUT bounds how long a publish waits for its
// acknowledgement before being reported as TimedOut.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);
// DEFAULT_RECONNECT_DELAY is how long the event loop backs off after
// a connection error before polling again (which reconnects).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

// PublisherOptions are optional parameters that can be passed to the
// publisher, all of which have default fallbacks.
#[derive(Clone, Debug, Default)]
pub struct PublisherOptions {
    // keep_alive sets the keepalive to use for MQTT broker connections.
    pub keep_alive: Option<Duration>,
    // message_channel_capacity is the number of requests the underlying
    // async client queue should buffer.
    pub message_channel_capacity: Option<usize>,
    // qos is the QoS every publish is sent with. Defaults to
    // ExactlyOnce.
    pub qos: Option<QoS>,
    // retain sets the retain flag on published messages.
    pub retain: Option<bool>,
    // ack_timeout is the bounded acknowledgement wait.
    pub ack_timeout: Option<Duration>,
    // reconnect_delay is the backoff between connection attempts.
    pub reconnect_delay: Option<Duration>,
    // credentials are optional username/password credentials
    // that can be provided to the MQTT server for authnz.
    pub credentials: Option<ClientCredentials>,
}

impl PublisherOptions {
    // Builder methods that consume and return Self
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_message_channel_capacity(mut self, capacity: usize) -> Self {
        self.message_channel_capacity = Some(capacity);
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = Some(retain);
        self
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = Some(ack_timeout);
        self
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = Some(reconnect_delay);
        self
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn effective_keep_alive(&self) -> Duration {
        self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE)
    }

    pub fn effective_channel_capacity(&self) -> usize {
        self.message_channel_capacity
            .unwrap_or(DEFAULT_MESSAGE_CHANNEL_CAPACITY)
    }

    pub fn effective_qos(&self) -> QoS {
        self.qos.unwrap_or(QoS::ExactlyOnce)
    }

    pub fn effective_retain(&self) -> bool {
        self.retain.unwrap_or(false)
    }

    pub fn effective_ack_timeout(&self) -> Duration {
        self.ack_timeout.unwrap_or(DEFAULT_ACK_TIMEOUT)
    }

    pub fn effective_reconnect_delay(&self) -> Duration {
        self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY)
    }
}

// ClientCredentials are used for providing a username
// and password to the MQTT server.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub username: String,
    pub password: String,
}
