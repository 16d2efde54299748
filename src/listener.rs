//! TCP listener and acceptor loop

use crate::command::CommandQueue;
use crate::config::RelayConfig;
use crate::lifecycle::{RelayError, RunningFlag};
use crate::session::{ConnectionHandler, ConnectionRegistry};
use socket2::SockRef;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{error, info, warn};

const LISTEN_BACKLOG: u32 = 128;

/// Bind the relay's listening socket with address reuse and keepalive
pub async fn bind(config: &RelayConfig) -> Result<TcpListener, RelayError> {
    let address = config.bind_address();
    let bind_error = |source| RelayError::Bind {
        address: address.clone(),
        source,
    };

    let addr = lookup_host(&address)
        .await
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| RelayError::Resolve(address.clone()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    };
    let socket = socket.map_err(bind_error)?;

    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.set_keepalive(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)
}

/// Accepts connections and spawns a handler for each
pub struct Acceptor {
    listener: TcpListener,
    queue: CommandQueue,
    registry: Arc<ConnectionRegistry>,
    running: RunningFlag,
    config: RelayConfig,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        queue: CommandQueue,
        registry: Arc<ConnectionRegistry>,
        running: RunningFlag,
        config: RelayConfig,
    ) -> Self {
        Self {
            listener,
            queue,
            registry,
            running,
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. The listening socket is closed when this returns.
    pub async fn run(self) {
        while self.running.is_running() {
            tokio::select! {
                biased;
                _ = self.running.cleared() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_handler(stream, addr).await,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        if !self.running.is_running() {
                            break;
                        }
                    }
                },
            }
        }

        info!("Listener closed");
    }

    async fn spawn_handler(&self, stream: TcpStream, addr: SocketAddr) {
        info!(peer = %addr, "New connection");

        // Pings and commands are one or a few bytes; send them immediately
        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %addr, "Failed to set TCP_NODELAY: {}", e);
        }
        if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
            warn!(peer = %addr, "Failed to enable keepalive: {}", e);
        }

        let (info, close) = self.registry.register(addr).await;
        let handler = ConnectionHandler::new(
            stream,
            info,
            close,
            self.queue.clone(),
            self.registry.clone(),
            self.running.clone(),
            &self.config,
        );
        tokio::spawn(handler.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loopback() -> RelayConfig {
        RelayConfig::with_address("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind(&loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_fails_on_port_in_use() {
        let first = bind(&loopback()).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind(&RelayConfig::with_address("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_accepted_connections_are_registered_until_shutdown() {
        let listener = bind(&loopback()).await.unwrap();
        let queue = CommandQueue::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let running = RunningFlag::new();
        let acceptor = Acceptor::new(
            listener,
            queue.clone(),
            registry.clone(),
            running.clone(),
            loopback(),
        );
        let addr = acceptor.local_addr().unwrap();
        let task = tokio::spawn(acceptor.run());

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.count().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both connections should register");

        running.clear();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("acceptor should stop")
            .unwrap();

        // Listener is gone
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
