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

// src/errors.rs
// Errors surfaced by the publishing client. A publish that simply was not
// acknowledged in time is not an error, see AckStatus::TimedOut.

use rumqttc::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    // RequestRejected is returned when the request could not be handed
    // to the event loop, e.g. the request channel is full or closed.
    #[error("MQTT request rejected by client: {0}")]
    RequestRejected(#[from] ClientError),
    // EventLoopClosed is returned when the event loop task has exited
    // and dropped the acknowledgement waiter.
    #[error("MQTT event loop is no longer running")]
    EventLoopClosed,
    // EmptyClientId is returned by connect. A persistent session needs
    // a client id.
    #[error("MQTT client id must not be empty")]
    EmptyClientId,
}

impl PublisherError {
    // is_backpressure reports whether the request channel was full at
    // the time of the publish, which is usually transient.
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            Self::RequestRejected(ClientError::TryRequest(_))
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::EventLoopClosed | Self::RequestRejected(ClientError::Request(_))
        )
    }
}
