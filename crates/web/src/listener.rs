//! Listener setup with ephemeral-port fallback

use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::{WebError, WebResult};

/// Delay before retrying on an OS-assigned port after a collision.
pub const FALLBACK_DELAY: Duration = Duration::from_secs(1);

/// Bind `host:port`, falling back to an OS-assigned port if `port` is taken.
///
/// Only "address in use" triggers the fallback; any other bind error, or a
/// failure of the fallback bind itself, is returned.
pub async fn bind_with_fallback(host: IpAddr, port: u16, delay: Duration) -> WebResult<TcpListener> {
    info!("Attempting to start server on port {}...", port);

    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse && port != 0 => {
            warn!("Port {} is already in use. Trying another port...", port);
            tokio::time::sleep(delay).await;
            TcpListener::bind((host, 0))
                .await
                .map_err(|source| WebError::Bind { port: 0, source })
        }
        Err(source) => Err(WebError::Bind { port, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn binds_requested_port_when_free() {
        let probe = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let listener = bind_with_fallback(LOCALHOST, port, Duration::ZERO).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn falls_back_to_ephemeral_port_on_collision() {
        let occupant = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let taken = occupant.local_addr().unwrap().port();

        let listener = bind_with_fallback(LOCALHOST, taken, Duration::from_millis(10))
            .await
            .unwrap();
        let bound = listener.local_addr().unwrap().port();

        assert_ne!(bound, taken);
        assert_ne!(bound, 0);
    }
}
