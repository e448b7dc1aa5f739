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

//! End-to-end admission scenarios driven through the public engine API.

use bouncer::guard::{
    AdmissionEngine, BucketConfig, Category, GuardError, PolicyVerdict, Sweeper,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn engine(capacity: usize, window_secs: u64) -> AdmissionEngine {
    AdmissionEngine::with_config(
        BucketConfig::uniform(capacity, secs(window_secs)),
        &[],
        &[],
    )
    .unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_capacity_five_window_fifteen() {
    let engine = engine(5, 15);

    for i in 0..5 {
        assert!(
            engine.authorize("alice", "secret", "192.0.2.10"),
            "attempt {} should be admitted",
            i + 1
        );
    }
    assert!(!engine.authorize("alice", "secret", "192.0.2.10"));

    tokio::time::advance(secs(16)).await;
    assert!(engine.authorize("alice", "secret", "192.0.2.10"));
}

#[tokio::test(start_paused = true)]
async fn test_login_limit_applies_across_addresses() {
    let engine = engine(3, 60);

    assert!(engine.authorize("alice", "a", "192.0.2.1"));
    assert!(engine.authorize("alice", "b", "192.0.2.2"));
    assert!(engine.authorize("alice", "c", "192.0.2.3"));
    assert!(!engine.authorize("alice", "d", "192.0.2.4"));

    // Other logins from fresh addresses are unaffected
    assert!(engine.authorize("bob", "e", "192.0.2.5"));
}

#[tokio::test(start_paused = true)]
async fn test_address_limit_applies_across_logins() {
    let engine = engine(2, 60);

    assert!(engine.authorize("u1", "p1", "198.51.100.7"));
    assert!(engine.authorize("u2", "p2", "198.51.100.7"));
    assert!(!engine.authorize("u3", "p3", "198.51.100.7"));
}

#[tokio::test(start_paused = true)]
async fn test_password_spraying_is_limited() {
    let engine = engine(2, 60);

    assert!(engine.authorize("u1", "Winter2024!", "198.51.100.1"));
    assert!(engine.authorize("u2", "Winter2024!", "198.51.100.2"));
    assert!(!engine.authorize("u3", "Winter2024!", "198.51.100.3"));
}

#[tokio::test(start_paused = true)]
async fn test_window_slides_after_rejection() {
    let engine = engine(2, 10);

    assert!(engine.authorize("alice", "pw", "192.0.2.1"));
    tokio::time::advance(secs(4)).await;
    assert!(engine.authorize("alice", "pw", "192.0.2.1"));
    tokio::time::advance(secs(1)).await;
    assert!(!engine.authorize("alice", "pw", "192.0.2.1"));

    // t=11: the t=0 attempt left the window, but the rejection at t=5 counts
    tokio::time::advance(secs(6)).await;
    assert!(!engine.authorize("alice", "pw", "192.0.2.1"));

    // t=20: only the t=11 attempt is inside the window
    tokio::time::advance(secs(9)).await;
    assert!(engine.authorize("alice", "pw", "192.0.2.1"));
}

#[tokio::test(start_paused = true)]
async fn test_drop_identity_resets_login_and_address() {
    let engine = engine(1, 60);

    assert!(engine.authorize("alice", "pw1", "192.0.2.1"));
    assert!(!engine.authorize("alice", "pw2", "192.0.2.1"));

    engine.drop_identity("alice", "192.0.2.1").unwrap();
    assert!(engine.authorize("alice", "pw3", "192.0.2.1"));
}

#[test]
fn test_deny_then_allow_flips_verdict() {
    let engine = engine(5, 15);
    engine.add_deny_policy("10.0.0.0/24").unwrap();

    let target = ip("10.0.0.5");
    assert_eq!(engine.policy().classify(&target).unwrap(), PolicyVerdict::Deny);
    assert!(!engine.authorize("alice", "pw", "10.0.0.5"));

    engine.add_allow_policy("10.0.0.0/24").unwrap();
    assert_eq!(engine.policy().classify(&target).unwrap(), PolicyVerdict::Allow);
    assert!(engine.policy().denied_networks().unwrap().is_empty());
    assert!(engine.authorize("alice", "pw", "10.0.0.5"));

    // Neither decision touched a bucket
    assert_eq!(engine.buckets().bucket_count().unwrap(), 0);
}

#[test]
fn test_allow_then_deny_flips_verdict() {
    let engine = engine(5, 15);
    engine.add_allow_policy("192.168.0.0/16").unwrap();
    assert!(engine.authorize("alice", "pw", "192.168.3.4"));

    engine.add_deny_policy("192.168.0.0/16").unwrap();
    assert!(engine.policy().allowed_networks().unwrap().is_empty());
    assert!(!engine.authorize("alice", "pw", "192.168.3.4"));
}

#[test]
fn test_allowed_address_is_never_rate_limited() {
    let engine = engine(1, 60);
    engine.add_allow_policy("127.0.0.1").unwrap();

    for _ in 0..20 {
        assert!(engine.authorize("root", "toor", "127.0.0.1"));
    }

    // The same login from elsewhere still has its full budget
    assert!(engine.authorize("root", "toor", "192.0.2.1"));
    assert!(!engine.authorize("root", "toor", "192.0.2.1"));
}

#[test]
fn test_policy_admin_idempotence() {
    let engine = engine(5, 15);

    engine.add_allow_policy("172.16.0.0/12").unwrap();
    engine.add_allow_policy("172.16.0.0/12").unwrap();
    assert_eq!(engine.policy().allow_count().unwrap(), 1);

    assert!(!engine.remove_deny_policy("172.16.0.0/12").unwrap());
    assert!(engine.remove_allow_policy("172.16.0.0/12").unwrap());
    assert!(!engine.remove_allow_policy("172.16.0.0/12").unwrap());
}

#[test]
fn test_invalid_prefix_reported_to_caller() {
    let engine = engine(5, 15);
    let err = engine.add_deny_policy("10.0.0.0/99").unwrap_err();
    assert!(matches!(err, GuardError::InvalidPrefix { .. }));
    assert_eq!(engine.policy().deny_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_reclaims_idle_identities() {
    let engine = engine(1, 10);
    let sweeper = Sweeper::spawn(Arc::clone(engine.buckets()), secs(10));

    // t=0
    assert!(engine.authorize("alice", "pw", "192.0.2.1"));
    assert_eq!(engine.buckets().bucket_count().unwrap(), 3);

    // t=9: one second before expiry, rejected but still activity
    tokio::time::sleep(secs(9)).await;
    assert!(!engine.authorize("alice", "pw", "192.0.2.1"));

    // Tick at t=10 keeps the buckets
    tokio::time::sleep(secs(2)).await;
    assert_eq!(engine.buckets().bucket_count().unwrap(), 3);

    // Tick at t=20 removes them
    tokio::time::sleep(secs(10)).await;
    assert_eq!(engine.buckets().bucket_count().unwrap(), 0);
    assert!(!engine.buckets().contains(Category::Login, "alice").unwrap());

    sweeper.shutdown().await.unwrap();
}

#[test]
fn test_concurrent_authorize_single_admission() {
    const THREADS: usize = 32;
    let engine = Arc::new(engine(1, 60));

    let admitted: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let engine = Arc::clone(&engine);
                s.spawn(move || engine.authorize("alice", "pw", "192.0.2.1"))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });

    assert_eq!(admitted, 1);
}
