//! Individual client connection handling

use super::registry::{CloseSignal, ConnectionInfo, ConnectionRegistry};
use crate::command::{CommandQueue, CommandToken};
use crate::config::RelayConfig;
use crate::lifecycle::RunningFlag;
use hexapod_shared::{protocol::PING_FRAME, Frame};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Why a connection handler ended
#[derive(Debug)]
pub enum Disconnect {
    /// Peer closed its side
    PeerClosed,
    /// Reading from the socket failed
    ReadFailed(io::Error),
    /// Replying to a ping failed
    PingReplyFailed(io::Error),
    /// The liveness probe after a read timeout could not be sent
    ProbeFailed(io::Error),
    /// The registry asked this connection to close
    CloseRequested,
    /// The relay is shutting down
    Shutdown,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::PeerClosed => write!(f, "closed by peer"),
            Disconnect::ReadFailed(e) => write!(f, "read error: {}", e),
            Disconnect::PingReplyFailed(e) => write!(f, "ping reply failed: {}", e),
            Disconnect::ProbeFailed(e) => write!(f, "liveness probe failed: {}", e),
            Disconnect::CloseRequested => write!(f, "closed by server"),
            Disconnect::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// Serves one accepted socket until it goes away
pub struct ConnectionHandler {
    stream: TcpStream,
    info: ConnectionInfo,
    close: CloseSignal,
    queue: CommandQueue,
    registry: Arc<ConnectionRegistry>,
    running: RunningFlag,
    read_timeout: Duration,
    read_buf: Vec<u8>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        info: ConnectionInfo,
        close: CloseSignal,
        queue: CommandQueue,
        registry: Arc<ConnectionRegistry>,
        running: RunningFlag,
        config: &RelayConfig,
    ) -> Self {
        Self {
            stream,
            info,
            close,
            queue,
            registry,
            running,
            read_timeout: config.read_timeout,
            read_buf: vec![0u8; config.read_buffer_size],
        }
    }

    /// Serve the connection, then close it, unregister it and halt the robot
    pub async fn run(mut self) -> Disconnect {
        let reason = self.serve().await;
        let addr = self.info.addr;
        info!(
            peer = %addr,
            reason = %reason,
            connected_for = ?self.info.connected_for(),
            "Client disconnected"
        );

        // Best effort, the peer may already be gone
        let _ = self.stream.shutdown().await;
        drop(self.stream);

        self.registry.unregister(self.info.id).await;

        // A vanished client must not leave the last motion running
        if let Err(e) = self.queue.push(CommandToken::stop()) {
            debug!(peer = %addr, "{}", e);
        }

        reason
    }

    async fn serve(&mut self) -> Disconnect {
        let addr = self.info.addr;

        while self.running.is_running() {
            let read = tokio::select! {
                biased;
                _ = self.close.requested() => return Disconnect::CloseRequested,
                _ = self.running.cleared() => return Disconnect::Shutdown,
                read = timeout(self.read_timeout, self.stream.read(&mut self.read_buf)) => read,
            };

            match read {
                Ok(Ok(0)) => return Disconnect::PeerClosed,
                Ok(Ok(n)) => match Frame::parse(&self.read_buf[..n]) {
                    Ok(Frame::Ping) => {
                        if let Err(reason) = self.write_ping(Disconnect::PingReplyFailed).await {
                            return reason;
                        }
                    }
                    Ok(Frame::Command(text)) => {
                        info!(peer = %addr, "Received command: {}", text);
                        if self.queue.push(CommandToken::from(text)).is_err() {
                            return Disconnect::Shutdown;
                        }
                    }
                    Err(e) => {
                        warn!(peer = %addr, "Dropping frame: {}", e);
                    }
                },
                Ok(Err(e)) => return Disconnect::ReadFailed(e),
                Err(_) => {
                    // Idle: make sure the peer is still there
                    debug!(peer = %addr, "Read timeout, probing");
                    if let Err(reason) = self.write_ping(Disconnect::ProbeFailed).await {
                        return reason;
                    }
                }
            }
        }

        Disconnect::Shutdown
    }

    /// Write a single zero byte. A peer that does not drain its receive
    /// window within the read timeout counts as a failed write.
    async fn write_ping(&mut self, failed: fn(io::Error) -> Disconnect) -> Result<(), Disconnect> {
        tokio::select! {
            biased;
            _ = self.close.requested() => Err(Disconnect::CloseRequested),
            _ = self.running.cleared() => Err(Disconnect::Shutdown),
            written = timeout(self.read_timeout, self.stream.write_all(&PING_FRAME)) => match written {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(failed(e)),
                Err(_) => Err(failed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "peer stopped reading",
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::SockRef;
    use std::net::Shutdown;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct Harness {
        client: TcpStream,
        queue: CommandQueue,
        registry: Arc<ConnectionRegistry>,
        running: RunningFlag,
        id: u64,
        task: JoinHandle<Disconnect>,
    }

    struct Unspawned {
        handler: ConnectionHandler,
        client: TcpStream,
        registry: Arc<ConnectionRegistry>,
    }

    async fn harness(read_timeout: Duration) -> Harness {
        harness_with(read_timeout, |_| {}).await
    }

    /// Like `harness`, letting the test adjust the server-side socket first
    async fn harness_with(read_timeout: Duration, prepare: impl FnOnce(&TcpStream)) -> Harness {
        let Unspawned {
            handler,
            client,
            registry,
        } = unspawned(read_timeout, prepare).await;
        let queue = handler.queue.clone();
        let running = handler.running.clone();
        let id = handler.info.id;
        let task = tokio::spawn(handler.run());

        Harness {
            client,
            queue,
            registry,
            running,
            id,
            task,
        }
    }

    async fn unspawned(read_timeout: Duration, prepare: impl FnOnce(&TcpStream)) -> Unspawned {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = listener.accept().await.unwrap();
        prepare(&stream);

        let queue = CommandQueue::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let running = RunningFlag::new();
        let config = RelayConfig {
            read_timeout,
            ..Default::default()
        };

        let (info, close) = registry.register(addr).await;
        let handler = ConnectionHandler::new(
            stream,
            info,
            close,
            queue,
            registry.clone(),
            running,
            &config,
        );

        Unspawned {
            handler,
            client,
            registry,
        }
    }

    fn close_write_side(stream: &TcpStream) {
        SockRef::from(stream).shutdown(Shutdown::Write).unwrap();
    }

    async fn finish(task: JoinHandle<Disconnect>) -> Disconnect {
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("handler should finish")
            .unwrap()
    }

    async fn wait_for_len(queue: &CommandQueue, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue should fill");
    }

    #[tokio::test]
    async fn test_ping_gets_single_zero_reply_and_is_not_queued() {
        let mut h = harness(Duration::from_secs(5)).await;

        h.client.write_all(&[0]).await.unwrap();
        let mut reply = [0xffu8; 1];
        h.client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0]);
        assert!(h.queue.is_empty());

        drop(h.client);
        finish(h.task).await;
    }

    #[tokio::test]
    async fn test_command_is_queued_unmodified() {
        let mut h = harness(Duration::from_secs(5)).await;

        h.client.write_all(b"STAND").await.unwrap();
        wait_for_len(&h.queue, 1).await;
        assert_eq!(h.queue.drain(), vec![CommandToken::from("STAND")]);

        drop(h.client);
        finish(h.task).await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_dropped_and_connection_stays_open() {
        let mut h = harness(Duration::from_secs(5)).await;

        h.client.write_all(&[0xff, 0xfe]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.queue.is_empty());
        assert!(h.registry.contains(h.id).await);

        // Still served
        h.client.write_all(&[0]).await.unwrap();
        let mut reply = [0xffu8; 1];
        h.client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0]);

        drop(h.client);
        finish(h.task).await;
    }

    #[tokio::test]
    async fn test_disconnect_enqueues_one_stop_and_unregisters() {
        let h = harness(Duration::from_secs(5)).await;

        drop(h.client);
        let reason = finish(h.task).await;

        assert!(matches!(reason, Disconnect::PeerClosed));
        assert!(!h.registry.contains(h.id).await);
        assert_eq!(h.queue.drain(), vec![CommandToken::stop()]);
    }

    #[tokio::test]
    async fn test_idle_connection_is_probed_and_kept() {
        let mut h = harness(Duration::from_millis(100)).await;

        let mut probe = [0xffu8; 1];
        tokio::time::timeout(Duration::from_secs(1), h.client.read_exact(&mut probe))
            .await
            .expect("probe should arrive")
            .unwrap();
        assert_eq!(probe, [0]);
        assert!(h.registry.contains(h.id).await);
        assert!(h.queue.is_empty());

        drop(h.client);
        finish(h.task).await;
    }

    #[tokio::test]
    async fn test_close_request_ends_handler() {
        let mut h = harness(Duration::from_secs(5)).await;

        h.registry.close_all().await;
        let reason = finish(h.task).await;
        assert!(matches!(reason, Disconnect::CloseRequested));

        let mut buf = [0u8; 8];
        let n = h.client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(h.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_dropped_when_queue_closed() {
        let mut h = harness(Duration::from_secs(5)).await;

        h.queue.close();
        h.running.clear();
        let reason = finish(h.task).await;

        assert!(matches!(reason, Disconnect::Shutdown));
        assert!(h.queue.is_empty());
        let mut buf = [0u8; 8];
        assert_eq!(h.client.read(&mut buf).await.unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_failed_ping_reply_closes_and_stops() {
        let mut h = harness_with(Duration::from_secs(5), close_write_side).await;

        h.client.write_all(&[0]).await.unwrap();
        let reason = finish(h.task).await;

        assert!(matches!(reason, Disconnect::PingReplyFailed(_)), "{reason}");
        assert!(!h.registry.contains(h.id).await);
        assert_eq!(h.queue.drain(), vec![CommandToken::stop()]);
    }

    #[tokio::test]
    async fn test_failed_idle_check_closes_and_stops() {
        let h = harness_with(Duration::from_millis(100), close_write_side).await;

        // Client stays silent, so the next thing the handler does is probe
        let reason = finish(h.task).await;

        assert!(matches!(reason, Disconnect::ProbeFailed(_)), "{reason}");
        assert!(!h.registry.contains(h.id).await);
        assert_eq!(h.queue.drain(), vec![CommandToken::stop()]);
        drop(h.client);
    }

    #[tokio::test]
    async fn test_stalled_idle_check_write_times_out() {
        let Unspawned {
            mut handler,
            client,
            ..
        } = unspawned(Duration::from_millis(100), |_| {}).await;

        // Fill both socket buffers; the client never reads
        let chunk = vec![0x55u8; 64 * 1024];
        loop {
            match handler.stream.try_write(&chunk) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("unexpected write error: {e}"),
            }
        }

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            handler.write_ping(Disconnect::ProbeFailed),
        )
        .await
        .expect("write should give up after the read timeout");

        match result {
            Err(Disconnect::ProbeFailed(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected a timed out probe, got {other:?}"),
        }
        drop(client);
    }

    #[tokio::test]
    async fn test_ping_write_gives_way_to_close_request() {
        let Unspawned {
            mut handler,
            client,
            registry,
        } = unspawned(Duration::from_secs(5), |_| {}).await;

        registry.close_all().await;
        let result = handler.write_ping(Disconnect::PingReplyFailed).await;

        assert!(matches!(result, Err(Disconnect::CloseRequested)));
        drop(client);
    }
}
