// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TCP front end for the admission engine.
//!
//! The server accepts connections and answers newline-delimited JSON
//! requests (see [`protocol`]) until its shutdown token is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use bouncer::config::ServerSettings;
//! use bouncer::guard::{AdmissionEngine, BucketConfig};
//! use bouncer::server::BouncerServer;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AdmissionEngine::with_config(BucketConfig::default(), &[], &[])?;
//!     let server = BouncerServer::new(Arc::new(engine), ServerSettings::default());
//!     server.run(CancellationToken::new()).await
//! }
//! ```

pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerSettings;
use crate::guard::AdmissionEngine;

pub use self::protocol::{ErrorCode, Request, Response};

/// Serves the admission engine over TCP.
pub struct BouncerServer {
    engine: Arc<AdmissionEngine>,
    settings: ServerSettings,
}

impl BouncerServer {
    /// Create a server for `engine`.
    pub fn new(engine: Arc<AdmissionEngine>, settings: ServerSettings) -> Self {
        Self { engine, settings }
    }

    /// The engine answering requests.
    pub fn engine(&self) -> &Arc<AdmissionEngine> {
        &self.engine
    }

    /// Listener settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.settings.listen_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;

        self.run_on_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    ///
    /// Open connections are closed and awaited before returning.
    pub async fn run_on_listener(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .context("Failed to get local address")?;
        tracing::info!(address = %local_addr, "Bouncer server listening");

        let max_connections = self.settings.max_connections.max(1);
        let connection_slots = Arc::new(Semaphore::new(max_connections));

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::trace!(peer = %peer, "Accepted connection");
                            self.spawn_connection_handler(stream, peer, Arc::clone(&connection_slots), shutdown.clone());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        // Every handler holds a slot until it returns
        let permits = u32::try_from(max_connections).unwrap_or(u32::MAX);
        let _drained = connection_slots.acquire_many(permits).await;

        tracing::info!("Bouncer server stopped");
        Ok(())
    }

    fn spawn_connection_handler(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        connection_slots: Arc<Semaphore>,
        shutdown: CancellationToken,
    ) {
        let engine = Arc::clone(&self.engine);
        let max_len = self.settings.max_request_bytes;

        tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = shutdown.cancelled() => return,
                permit = connection_slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(peer = %peer, "Failed to acquire connection slot");
                        return;
                    }
                },
            };

            tracing::debug!(peer = %peer, "New client connection");
            if let Err(e) = handle_connection(&engine, stream, peer, max_len, shutdown).await {
                tracing::warn!(peer = %peer, error = %e, "Connection error");
            }
        });
    }
}

async fn handle_connection(
    engine: &AdmissionEngine,
    stream: TcpStream,
    peer: SocketAddr,
    max_len: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    // One extra byte for the newline
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(limit);
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = limited.read_until(b'\n', &mut buf) => read?,
        };

        if read == 0 {
            break;
        }

        let request = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let request = request.strip_suffix(b"\r").unwrap_or(request);

        if request.len() > max_len {
            let response = Response::error(
                ErrorCode::BadRequest,
                format!("request exceeds {max_len} bytes"),
            );
            send_response(&mut writer, &response).await?;
            tracing::warn!(peer = %peer, "Request too long, closing connection");
            break;
        }

        let response = match std::str::from_utf8(request) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => protocol::handle_line(engine, line),
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Request is not valid UTF-8");
                Response::error(ErrorCode::BadRequest, format!("request is not valid UTF-8: {e}"))
            }
        };
        send_response(&mut writer, &response).await?;
    }

    tracing::debug!(peer = %peer, "Client disconnected");
    Ok(())
}

async fn send_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let mut encoded = serde_json::to_string(response)?;
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await?;
    Ok(())
}
