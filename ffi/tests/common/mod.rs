//! Shared setup for tests that drive the real native library.

use std::net::SocketAddr;

use impersonate_ffi::{Client, Error};

/// Profile present in every libcurl-impersonate build.
pub const TARGET: &str = "chrome116";

/// Start the mock server on a random port of the current runtime.
pub async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        mock_server::run(listener).await.unwrap();
    });
    addr
}

/// A client over the installed library, or `None` (test skipped) when no
/// library can be discovered on this machine.
pub fn client() -> Option<Client> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    match Client::new() {
        Ok(client) => Some(client),
        Err(Error::Discovery { failures }) => {
            eprintln!(
                "skipping: libcurl-impersonate not found ({} candidates tried)",
                failures.len()
            );
            None
        }
        Err(e) => panic!("library load failed: {e}"),
    }
}
