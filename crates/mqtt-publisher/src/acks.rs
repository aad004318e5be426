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

// src/acks.rs
// Maps publish requests to broker acknowledgements.
//
// rumqttc doesn't hand back a packet identifier from publish(), so the
// tracker relies on the event loop processing requests in FIFO order:
// every registered waiter is queued, and the next Outgoing::Publish
// event claims the oldest queued waiter and binds it to its pkid. The
// waiter then resolves on PUBACK (QoS 1) or PUBCOMP (QoS 2). QoS 0
// waiters resolve as soon as the packet is written.
//
// Retransmissions after a reconnect reuse a pkid that is already
// in flight, so they don't consume a queued waiter.

use std::collections::{HashMap, VecDeque};

use rumqttc::{Event, Outgoing, Packet, QoS};
use tokio::sync::oneshot;

struct PendingAck {
    qos: QoS,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct AckTracker {
    // queued holds waiters whose publish request hasn't been
    // written by the event loop yet, oldest first.
    queued: VecDeque<PendingAck>,
    // inflight holds waiters bound to a packet identifier that are
    // waiting for the final acknowledgement.
    inflight: HashMap<u16, PendingAck>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // register queues a waiter for the next publish request. Callers
    // must hand the request to the event loop while still holding the
    // tracker, so queue order matches request order.
    pub fn register(&mut self, qos: QoS) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.queued.push_back(PendingAck { qos, tx });
        rx
    }

    // unregister_last drops the most recently registered waiter. Used
    // when the publish request never made it into the request channel.
    pub fn unregister_last(&mut self) {
        self.queued.pop_back();
    }

    // handle_event advances the tracker with an event from the event
    // loop. Returns the packet identifier that was acknowledged, if any.
    pub fn handle_event(&mut self, event: &Event) -> Option<u16> {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => self.on_publish_written(*pkid),
            Event::Incoming(Packet::PubAck(ack)) => self.on_ack(ack.pkid, QoS::AtLeastOnce),
            Event::Incoming(Packet::PubComp(comp)) => self.on_ack(comp.pkid, QoS::ExactlyOnce),
            _ => None,
        }
    }

    fn on_publish_written(&mut self, pkid: u16) -> Option<u16> {
        if pkid != 0 && self.inflight.contains_key(&pkid) {
            tracing::debug!(pkid, "retransmitted publish, keeping existing waiter");
            return None;
        }

        let pending = self.queued.pop_front()?;
        match pending.qos {
            QoS::AtMostOnce => {
                // Nothing more is coming from the broker for QoS 0.
                let _ = pending.tx.send(());
                Some(pkid)
            }
            _ => {
                self.inflight.insert(pkid, pending);
                None
            }
        }
    }

    fn on_ack(&mut self, pkid: u16, expected: QoS) -> Option<u16> {
        match self.inflight.remove(&pkid) {
            Some(pending) if pending.qos == expected => {
                // A dropped receiver means the publisher already gave up
                // waiting; the broker still has the message.
                let _ = pending.tx.send(());
                Some(pkid)
            }
            Some(pending) => {
                tracing::warn!(
                    pkid,
                    qos = ?pending.qos,
                    "acknowledgement doesn't match publish QoS, ignoring"
                );
                self.inflight.insert(pkid, pending);
                None
            }
            None => {
                tracing::debug!(pkid, "acknowledgement for unknown packet id");
                None
            }
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}
