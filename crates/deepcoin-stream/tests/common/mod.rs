/*
[INPUT]:  Test configuration and loopback transport requirements
[OUTPUT]: Shared test utilities for runner tests
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deepcoin_adapter::ws::{LoopbackPeer, loopback};
use deepcoin_adapter::{DeepcoinWebsocketManager, Endpoint};
use deepcoin_stream::{StreamConfig, StreamRunner};
use serde_json::Value;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Await a future with the shared test timeout
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out waiting in test")
}

/// Poll `condition` until it holds or the test timeout expires
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

pub fn parse(text: &str) -> Value {
    serde_json::from_str(text).expect("outbound frame should be JSON")
}

/// Runner over a loopback transport for `endpoint`
pub fn loopback_runner(config: StreamConfig, endpoint: Endpoint) -> (Arc<StreamRunner>, LoopbackPeer) {
    let (transport, peer) = loopback();
    let manager =
        DeepcoinWebsocketManager::with_transport(endpoint, Arc::new(transport), config.connection_config())
            .expect("manager should build");
    (Arc::new(StreamRunner::with_manager(config, manager)), peer)
}
