//! Local port helpers
//!
//! Ports handed out here are only a hint: another process can grab the port
//! between allocation and the daemon binding it, so callers re-check with
//! [`is_port_available`] right before spawning.

use std::net::TcpListener;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::PortError;

/// Ask the OS for an ephemeral port that is currently free on `host`
pub fn find_free_port(host: &str) -> Result<u16, PortError> {
    let allocation_error = |source| PortError::Allocation {
        host: host.to_string(),
        source,
    };

    let listener = TcpListener::bind((host, 0)).map_err(allocation_error)?;
    let port = listener.local_addr().map_err(allocation_error)?.port();
    tracing::debug!(host, port, "Allocated free port");
    Ok(port)
}

/// Check whether `port` can currently be bound on `host`
pub fn is_port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Check whether something accepts TCP connections on `host:port`
pub async fn is_port_accepting(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).await.is_ok()
}

/// Poll until something accepts connections on `host:port`
///
/// Returns `false` once `timeout` elapses without a successful connect.
pub async fn wait_for_port(host: &str, port: u16, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if is_port_accepting(host, port).await {
            return true;
        }
        if Instant::now() + poll > deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port_is_bindable() {
        let port = find_free_port("127.0.0.1").unwrap();
        assert_ne!(port, 0);
        assert!(is_port_available("127.0.0.1", port));
    }

    #[test]
    fn test_bound_port_is_not_available() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available("127.0.0.1", port));
    }

    #[test]
    fn test_non_local_address_is_allocation_error() {
        // TEST-NET-1 is never assigned to a local interface
        let err = find_free_port("192.0.2.1").unwrap_err();
        assert!(matches!(err, PortError::Allocation { .. }));
    }

    #[tokio::test]
    async fn test_port_accepting() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_accepting("127.0.0.1", port).await);

        drop(listener);
        assert!(!is_port_accepting("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_wait_for_port_sees_late_listener() {
        let port = find_free_port("127.0.0.1").unwrap();
        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        let bound = wait_for_port(
            "127.0.0.1",
            port,
            Duration::from_secs(5),
            Duration::from_millis(25),
        )
        .await;
        assert!(bound);
        binder.abort();
    }

    #[tokio::test]
    async fn test_wait_for_port_gives_up() {
        let port = find_free_port("127.0.0.1").unwrap();
        let started = std::time::Instant::now();
        let bound = wait_for_port(
            "127.0.0.1",
            port,
            Duration::from_millis(200),
            Duration::from_millis(50),
        )
        .await;
        assert!(!bound);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
