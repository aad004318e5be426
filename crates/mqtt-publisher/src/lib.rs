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

// src/lib.rs
// Main exports for the acknowledged MQTT publishing client.

pub mod acks;
pub mod client;
pub mod errors;
pub mod options;
pub mod stats;

// Export some things for convenience.
pub use acks::AckTracker;
pub use client::{AckStatus, EventLoopHandle, MqttPublisher};
pub use errors::PublisherError;
pub use options::{ClientCredentials, PublisherOptions};
pub use rumqttc::QoS;
pub use stats::{PublishStats, PublishStatsTracker};
