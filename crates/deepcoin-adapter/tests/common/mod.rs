/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for deepcoin-adapter tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deepcoin_adapter::ws::{LoopbackPeer, LoopbackSession, loopback};
use deepcoin_adapter::{
    ClientConfig,
    ConnectionConfig,
    Credentials,
    DeepcoinClient,
    DeepcoinWebsocketManager,
    Endpoint,
};
use wiremock::MockServer;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_credentials() -> Credentials {
    Credentials {
        api_key: "test-key".to_string(),
        api_secret: "test-secret".to_string(),
        passphrase: "test-pass".to_string(),
    }
}

/// Signed client pointed at the mock server
pub fn mock_client(server: &MockServer) -> DeepcoinClient {
    let mut client = DeepcoinClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
        .expect("client should build");
    client.set_credentials(test_credentials());
    client
}

/// Loopback settings without heartbeat noise
pub fn quiet_config() -> ConnectionConfig {
    ConnectionConfig {
        ping_interval: None,
        handshake_timeout: TEST_TIMEOUT,
    }
}

/// Manager over a loopback transport, not yet started
pub fn loopback_manager(endpoint: Endpoint) -> (DeepcoinWebsocketManager, LoopbackPeer) {
    let (transport, peer) = loopback();
    let manager = DeepcoinWebsocketManager::with_transport(endpoint, Arc::new(transport), quiet_config())
        .expect("manager should build");
    (manager, peer)
}

/// Start the manager and return the server side of the accepted session
pub async fn start_and_accept(
    manager: &DeepcoinWebsocketManager,
    peer: &mut LoopbackPeer,
) -> LoopbackSession {
    manager.start();
    let session = within(peer.accept())
        .await
        .expect("client should connect");
    assert!(manager.wait_until_alive(TEST_TIMEOUT).await);
    session
}

/// Await a future with the shared test timeout
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out waiting in test")
}
