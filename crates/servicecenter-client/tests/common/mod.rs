//! Common test utilities for service center client integration tests

#![allow(dead_code)]

pub mod fake_registry;

use fake_registry::FakeRegistry;
use servicecenter_client::{RegistryClient, Tenant, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Test timeout for async operations
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry client talking to an in-memory registry
pub fn fake_client(registry: Arc<FakeRegistry>) -> RegistryClient {
    let transport = Transport::with_connector(["http://registry.test:30100"], registry);
    RegistryClient::with_transport(Tenant::default(), transport)
        .expect("Failed to create registry client")
}

/// Poll `check` until it holds or [`TEST_TIMEOUT`] elapses
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + TEST_TIMEOUT;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
