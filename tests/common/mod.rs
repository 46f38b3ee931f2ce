//! Shared utilities for integration tests.

use std::net::SocketAddr;

use routemux::{Group, Shutdown};
use tokio::net::TcpListener;

/// A running server; dropping it stops the server.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Serve `root` on an ephemeral local port.
pub async fn start(root: &Group) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = root.server();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &signal).await;
    });

    TestServer { addr, shutdown }
}
