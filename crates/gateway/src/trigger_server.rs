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

//! TCP listener receiving tag reads. Every tag becomes one outbound message.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::TriggerFraming;
use crate::context::GatewayContext;
use crate::shutdown_handle::{ShutdownHandle, TaskHandle};

const READ_BUFFER_SIZE: usize = 1024;
// A newline-framed tag longer than this is discarded.
const MAX_TAG_BYTES: usize = 4 * READ_BUFFER_SIZE;
// Read errors other than end-of-stream are retried, up to this many in a row.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 3;

/// Bind `listen_address` and serve trigger connections in the background.
pub async fn spawn(
    listen_address: SocketAddr,
    framing: TriggerFraming,
    context: Arc<GatewayContext>,
) -> Result<Handle, SpawnError> {
    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|error| SpawnError::Listening {
            addr: listen_address,
            error,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|error| SpawnError::Listening {
            addr: listen_address,
            error,
        })?;
    tracing::info!(%local_addr, ?framing, "trigger server listening");

    let task = TaskHandle::spawn(|shutdown| run(listener, framing, context, shutdown));
    Ok(Handle { local_addr, task })
}

#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("Error listening on {addr}: {error}")]
    Listening { addr: SocketAddr, error: io::Error },
}

pub struct Handle {
    local_addr: SocketAddr,
    task: TaskHandle,
}

impl Handle {
    /// The address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl ShutdownHandle<()> for Handle {
    fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<()>) {
        self.task.into_parts()
    }
}

/// Accept connections until `shutdown`, then abort the connections still being handled.
async fn run(
    listener: TcpListener,
    framing: TriggerFraming,
    context: Arc<GatewayContext>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accept_result = listener.accept() => match accept_result {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "trigger connection accepted");
                    connections.spawn(handle_connection(socket, peer, framing, context.clone()));
                }
                Err(error) => {
                    tracing::warn!(%error, "error accepting trigger connection");
                }
            },

            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(error) = joined
                    && error.is_panic()
                {
                    tracing::error!(%error, "trigger connection handler panicked");
                }
            }

            _ = &mut shutdown => break,
        }
    }
    connections.shutdown().await;
    tracing::debug!("trigger server stopped");
}

/// Read tags from `reader` until end-of-stream, handling each one before reading the next.
pub async fn handle_connection<R>(
    mut reader: R,
    peer: SocketAddr,
    framing: TriggerFraming,
    context: Arc<GatewayContext>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut framer = TagFramer::new(framing);
    let mut consecutive_errors = 0;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                consecutive_errors = 0;
                for tag in framer.push(&buffer[..n]) {
                    context.handle_tag(&tag).await;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                consecutive_errors += 1;
                tracing::warn!(%error, %peer, "error reading from trigger connection");
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    break;
                }
            }
        }
    }

    if let Some(tag) = framer.finish() {
        context.handle_tag(&tag).await;
    }
    tracing::debug!(%peer, "trigger connection closed");
}

/// Connect to a trigger server at `address` and send a single tag, as a tag reader would.
pub async fn send_tag(address: SocketAddr, tag: &str, newline: bool) -> io::Result<()> {
    let mut stream = TcpStream::connect(address).await?;
    stream.write_all(tag.as_bytes()).await?;
    if newline {
        stream.write_all(b"\n").await?;
    }
    stream.shutdown().await
}

/// Splits the bytes of one connection into tags.
pub struct TagFramer {
    framing: TriggerFraming,
    pending: Vec<u8>,
    // Set while skipping the rest of an oversized line, up to its newline.
    discarding: bool,
}

impl TagFramer {
    pub fn new(framing: TriggerFraming) -> Self {
        Self {
            framing,
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Feed the bytes of one read, returning the tags it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.framing {
            TriggerFraming::Chunk => decode_tag(bytes).into_iter().collect(),
            TriggerFraming::Newline => {
                let mut tags = Vec::new();
                let mut bytes = bytes;
                if self.discarding {
                    let Some(end) = bytes.iter().position(|b| *b == b'\n') else {
                        return tags;
                    };
                    self.discarding = false;
                    bytes = &bytes[end + 1..];
                }

                self.pending.extend_from_slice(bytes);
                while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = self.pending.drain(..=end).collect();
                    let line = &line[..end];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    tags.extend(decode_tag(line));
                }
                if self.pending.len() > MAX_TAG_BYTES {
                    tracing::warn!(
                        len = self.pending.len(),
                        "no newline in trigger input, discarding the line"
                    );
                    self.pending.clear();
                    self.discarding = true;
                }
                tags
            }
        }
    }

    /// The unterminated tag left over at end-of-stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.discarding = false;
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.strip_suffix(b"\r").unwrap_or(&rest);
        decode_tag(rest)
    }
}

fn decode_tag(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}
