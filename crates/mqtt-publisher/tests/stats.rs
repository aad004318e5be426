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

// tests/stats.rs
// Tests for publish statistics tracking.

use std::sync::Arc;
use std::thread;

use mqtt_publisher::{PublishStats, PublishStatsTracker};

#[test]
fn test_publish_stats_tracker_creation() {
    let tracker = PublishStatsTracker::new();
    assert_eq!(tracker.to_stats(), PublishStats::default());
}

#[test]
fn test_publish_stats_outcomes() {
    let tracker = PublishStatsTracker::new();

    tracker.increment_confirmed(120);
    tracker.increment_confirmed(80);
    tracker.increment_timed_out();
    tracker.increment_rejected();
    tracker.increment_event_loop_errors();
    tracker.increment_event_loop_errors();

    let stats = tracker.to_stats();
    assert_eq!(stats.total_confirmed, 2);
    assert_eq!(stats.total_bytes_confirmed, 200);
    assert_eq!(stats.total_timed_out, 1);
    assert_eq!(stats.total_rejected, 1);
    assert_eq!(stats.total_event_loop_errors, 2);
}

#[test]
fn test_publish_stats_reset() {
    let tracker = PublishStatsTracker::new();
    tracker.increment_confirmed(10);
    tracker.increment_timed_out();

    tracker.reset_counters();
    assert_eq!(tracker.to_stats(), PublishStats::default());
}

#[test]
fn test_publish_stats_concurrent_updates() {
    let tracker = Arc::new(PublishStatsTracker::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tracker = tracker.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    tracker.increment_confirmed(4);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = tracker.to_stats();
    assert_eq!(stats.total_confirmed, 1000);
    assert_eq!(stats.total_bytes_confirmed, 4000);
}
