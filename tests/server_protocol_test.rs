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

//! Wire-level tests against a running server on a loopback port.

use bouncer::config::ServerSettings;
use bouncer::guard::{AdmissionEngine, BucketConfig};
use bouncer::server::{ErrorCode, Response};
use bouncer::BouncerServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Harness {
    engine: Arc<AdmissionEngine>,
    shutdown: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
    addr: std::net::SocketAddr,
}

impl Harness {
    async fn start(capacity: usize) -> Self {
        let engine = Arc::new(
            AdmissionEngine::with_config(
                BucketConfig::uniform(capacity, Duration::from_secs(60)),
                &[],
                &[],
            )
            .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = BouncerServer::new(Arc::clone(&engine), ServerSettings::default());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { server.run_on_listener(listener, token).await });

        Self {
            engine,
            shutdown,
            task,
            addr,
        }
    }

    async fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (read, write) = stream.into_split();
        Client {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    async fn send(&mut self, line: &str) -> Response {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("no reply")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&reply).unwrap()
    }

    async fn authorize(&mut self, login: &str, ip: &str) -> bool {
        let line = format!(
            r#"{{"op":"authorize","login":"{login}","password":"pw","ip":"{ip}"}}"#
        );
        match self.send(&line).await {
            Response::Verdict { ok } => ok,
            other => panic!("unexpected response: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_authorize_until_rejected() {
    let harness = Harness::start(2).await;
    let mut client = harness.connect().await;

    assert!(client.authorize("alice", "192.0.2.1").await);
    assert!(client.authorize("alice", "192.0.2.1").await);
    assert!(!client.authorize("alice", "192.0.2.1").await);

    harness.stop().await;
}

#[tokio::test]
async fn test_drop_identity_over_the_wire() {
    let harness = Harness::start(1).await;
    let mut client = harness.connect().await;

    assert!(client.authorize("alice", "192.0.2.1").await);
    assert!(!client.authorize("alice", "192.0.2.1").await);

    let reply = client
        .send(r#"{"op":"drop_identity","login":"alice","ip":"192.0.2.1"}"#)
        .await;
    assert_eq!(reply, Response::Ack);

    // Password bucket is still full, so use a different password
    let reply = client
        .send(r#"{"op":"authorize","login":"alice","password":"other","ip":"192.0.2.1"}"#)
        .await;
    assert_eq!(reply, Response::Verdict { ok: true });

    harness.stop().await;
}

#[tokio::test]
async fn test_policy_administration_over_the_wire() {
    let harness = Harness::start(5).await;
    let mut client = harness.connect().await;

    let reply = client.send(r#"{"op":"add_deny","subnet":"10.0.0.0/24"}"#).await;
    assert_eq!(reply, Response::Ack);
    assert!(!client.authorize("alice", "10.0.0.5").await);

    let reply = client.send(r#"{"op":"add_allow","subnet":"10.0.0.0/24"}"#).await;
    assert_eq!(reply, Response::Ack);
    assert!(client.authorize("alice", "10.0.0.5").await);
    assert_eq!(harness.engine.policy().deny_count().unwrap(), 0);

    let reply = client.send(r#"{"op":"remove_allow","subnet":"10.0.0.0/24"}"#).await;
    assert_eq!(reply, Response::Ack);
    assert_eq!(harness.engine.policy().allow_count().unwrap(), 0);

    // Removing an absent prefix is still acknowledged
    let reply = client.send(r#"{"op":"remove_deny","subnet":"10.0.0.0/24"}"#).await;
    assert_eq!(reply, Response::Ack);

    harness.stop().await;
}

#[tokio::test]
async fn test_errors_keep_connection_open() {
    let harness = Harness::start(5).await;
    let mut client = harness.connect().await;

    match client.send(r#"{"op":"add_deny","subnet":"not-a-cidr"}"#).await {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidPrefix),
        other => panic!("unexpected response: {other:?}"),
    }

    match client.send("{this is not json").await {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::BadRequest),
        other => panic!("unexpected response: {other:?}"),
    }

    match client.send(r#"{"op":"reboot"}"#).await {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::BadRequest),
        other => panic!("unexpected response: {other:?}"),
    }

    assert!(client.authorize("alice", "192.0.2.1").await);

    harness.stop().await;
}

#[tokio::test]
async fn test_clients_share_one_engine() {
    let harness = Harness::start(1).await;
    let mut first = harness.connect().await;
    let mut second = harness.connect().await;

    assert!(first.authorize("alice", "192.0.2.1").await);
    assert!(!second.authorize("alice", "192.0.2.1").await);

    harness.stop().await;
}
