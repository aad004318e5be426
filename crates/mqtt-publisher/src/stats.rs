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

// src/stats.rs
// Publish statistics for acknowledged message delivery.
//
// Lock-free atomic counters tracking how publishes resolved, so callers
// can report broker health without touching the publish path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// PublishStats stores a snapshot of publish outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishStats {
    // total_confirmed is count of publishes the broker acknowledged
    // within the bounded wait.
    pub total_confirmed: usize,
    // total_timed_out is count of publishes handed to the client but
    // not acknowledged within the bounded wait.
    pub total_timed_out: usize,
    // total_rejected is count of publishes the client refused to
    // queue at all.
    pub total_rejected: usize,
    // total_bytes_confirmed is total payload size of confirmed
    // publishes.
    pub total_bytes_confirmed: usize,
    // total_event_loop_errors is the number of connection errors seen
    // by the event loop.
    pub total_event_loop_errors: usize,
}

// PublishStatsTracker enables thread-safe updates to publish
// statistics using atomic operations.
#[derive(Debug, Default)]
pub struct PublishStatsTracker {
    confirmed_count: Arc<AtomicUsize>,
    timed_out_count: Arc<AtomicUsize>,
    rejected_count: Arc<AtomicUsize>,
    confirmed_bytes: Arc<AtomicUsize>,
    event_loop_errors: Arc<AtomicUsize>,
}

impl PublishStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // increment_confirmed records a publish acknowledged by the broker
    // (e.g. increment_confirmed(512) for a 512-byte payload).
    pub fn increment_confirmed(&self, bytes: usize) {
        self.confirmed_count.fetch_add(1, Ordering::Relaxed);
        self.confirmed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_timed_out(&self) {
        self.timed_out_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    // increment_event_loop_errors is updated any time polling the
    // event loop returns a connection error.
    pub fn increment_event_loop_errors(&self) {
        self.event_loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    // reset_counters clears all counters back to zero.
    pub fn reset_counters(&self) {
        self.confirmed_count.store(0, Ordering::Relaxed);
        self.timed_out_count.store(0, Ordering::Relaxed);
        self.rejected_count.store(0, Ordering::Relaxed);
        self.confirmed_bytes.store(0, Ordering::Relaxed);
        self.event_loop_errors.store(0, Ordering::Relaxed);
    }

    // to_stats creates an immutable snapshot of current publish
    // statistics.
    pub fn to_stats(&self) -> PublishStats {
        PublishStats {
            total_confirmed: self.confirmed_count.load(Ordering::Relaxed),
            total_timed_out: self.timed_out_count.load(Ordering::Relaxed),
            total_rejected: self.rejected_count.load(Ordering::Relaxed),
            total_bytes_confirmed: self.confirmed_bytes.load(Ordering::Relaxed),
            total_event_loop_errors: self.event_loop_errors.load(Ordering::Relaxed),
        }
    }
}
