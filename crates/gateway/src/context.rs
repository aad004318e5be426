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

use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::delivery::{DeliveryCoordinator, DeliveryOutcome};
use crate::location::FixTracker;
use crate::message::compose;
use crate::modem::ModemCache;

/// Shared state of a running gateway. Built once in [`crate::spawn`] and handed to every
/// component that needs it.
pub struct GatewayContext {
    pub credentials: CredentialStore,
    pub fixes: Arc<FixTracker>,
    pub modem: Arc<ModemCache>,
    pub coordinator: Arc<DeliveryCoordinator>,
}

impl GatewayContext {
    /// Refresh the modem status, compose a message for `tag` and deliver it. A failed modem
    /// refresh doesn't stop the message, it carries the last known status instead.
    pub async fn handle_tag(&self, tag: &str) -> DeliveryOutcome {
        // Failures are logged by the cache.
        let _ = self.modem.refresh().await;

        let message = compose(tag, self.fixes.read_best(), self.modem.snapshot());
        let outcome = self.coordinator.deliver(&message).await;
        tracing::info!(tag, ?outcome, fix = message.gps.fix, "tag handled");
        outcome
    }
}
