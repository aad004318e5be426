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

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Convenience trait for a task with a shutdown handle (in the form of a [`oneshot::Sender<()>`])
///
/// Dropping the sender and sending on it mean the same thing: "shut down now". Every loop in this
/// crate selects on the receiving end at each suspension point.
pub trait ShutdownHandle<R> {
    fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<R>);

    /// Signal shutdown and wait for the task to exit. Returns `None` if the task panicked or was
    /// aborted.
    fn shutdown_and_wait(self) -> impl Future<Output = Option<R>> + Send
    where
        Self: Send + Sized,
        R: Send,
    {
        async move {
            let (shutdown_tx, join_handle) = self.into_parts();
            std::mem::drop(shutdown_tx);
            match join_handle.await {
                Ok(result) => Some(result),
                Err(error) => {
                    tracing::error!(%error, "background task did not exit cleanly");
                    None
                }
            }
        }
    }
}

/// A spawned background loop together with the sender that stops it.
pub struct TaskHandle<R = ()> {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<R>,
}

impl<R: Send + 'static> TaskHandle<R> {
    /// Spawn `task`, handing it the receiving end of a fresh shutdown channel.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(task(shutdown_rx));
        Self {
            shutdown_tx,
            join_handle,
        }
    }
}

impl<R> ShutdownHandle<R> for TaskHandle<R> {
    fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<R>) {
        (self.shutdown_tx, self.join_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropping_sender_stops_task() {
        let handle = TaskHandle::spawn(|mut shutdown| async move {
            let mut ticks = 0;
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => ticks += 1,
                }
            }
            ticks
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handle.shutdown_and_wait().await.is_some());
    }

    #[tokio::test]
    async fn test_panicked_task_reports_none() {
        let handle = TaskHandle::spawn(|_shutdown| async move {
            panic!("boom");
        });
        assert_eq!(handle.shutdown_and_wait().await, None::<()>);
    }
}
