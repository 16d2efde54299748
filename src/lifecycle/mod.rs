//! Relay lifecycle
//!
//! Owns start-up and shutdown sequencing: binding the listener, spawning the
//! acceptor and dispatcher, and tearing everything down again so the robot is
//! left stopped.

mod running;
mod signal;

pub use running::RunningFlag;
pub use signal::shutdown_signal;

use crate::actuation::Actuator;
use crate::command::{CommandDispatcher, CommandQueue, DispatchMonitor};
use crate::config::RelayConfig;
use crate::listener::{self, Acceptor};
use crate::session::ConnectionRegistry;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Errors that abort start-up
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Address {0} did not resolve")]
    Resolve(String),
}

/// What shutdown found and released
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued tokens thrown away without dispatch
    pub discarded_commands: usize,
    /// Connections that were asked to close
    pub closed_connections: usize,
    /// Connections still registered after the close grace expired
    pub lingering_connections: usize,
}

/// A running relay
pub struct RelayServer {
    config: RelayConfig,
    local_addr: SocketAddr,
    running: RunningFlag,
    queue: CommandQueue,
    registry: Arc<ConnectionRegistry>,
    actuator: Arc<dyn Actuator>,
    monitor: DispatchMonitor,
    acceptor_task: Mutex<Option<JoinHandle<()>>>,
    dispatcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    /// Bind the listener and start accepting and dispatching.
    ///
    /// Failing to bind is the only fatal error of the relay.
    pub async fn start(
        config: RelayConfig,
        actuator: Arc<dyn Actuator>,
    ) -> Result<Arc<Self>, RelayError> {
        let listener = listener::bind(&config).await?;
        let local_addr = listener.local_addr().map_err(|source| RelayError::Bind {
            address: config.bind_address(),
            source,
        })?;

        let running = RunningFlag::new();
        let queue = CommandQueue::new();
        let registry = Arc::new(ConnectionRegistry::new());

        let (dispatcher, monitor) =
            CommandDispatcher::new(queue.clone(), actuator.clone(), running.clone(), &config);
        let dispatcher_task = tokio::spawn(dispatcher.run());

        let acceptor = Acceptor::new(
            listener,
            queue.clone(),
            registry.clone(),
            running.clone(),
            config.clone(),
        );
        let acceptor_task = tokio::spawn(acceptor.run());

        info!("Server started on {}", local_addr);

        Ok(Arc::new(Self {
            config,
            local_addr,
            running,
            queue,
            registry,
            actuator,
            monitor,
            acceptor_task: Mutex::new(Some(acceptor_task)),
            dispatcher_task: Mutex::new(Some(dispatcher_task)),
        }))
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Read-only view of the dispatch state
    pub fn monitor(&self) -> DispatchMonitor {
        self.monitor.clone()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Block until an operator signal arrives (or something else shuts the
    /// relay down), then shut down exactly once.
    pub async fn run_until_signal(&self) -> ShutdownReport {
        tokio::select! {
            _ = shutdown_signal() => info!("Shutting down server..."),
            _ = self.running.cleared() => {}
        }
        self.shutdown().await
    }

    /// Stop accepting, stop dispatching, halt the robot, discard pending
    /// commands, close every connection and release the listener.
    ///
    /// Never fails; only the first call does any work.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.running.clear() {
            debug!("Shutdown already performed");
            return ShutdownReport::default();
        }

        // Late STOPs from exiting handlers are refused from here on
        self.queue.close();
        // The final stop has to land after any in-flight actuation, bounded by close_grace
        self.join_task(&self.dispatcher_task, "dispatcher").await;

        // Directly, not through the queue: the dispatcher is gone
        if let Err(e) = self.actuator.stop().await {
            warn!("Stop during shutdown failed: {}", e);
        }

        let discarded_commands = self.queue.drain().len();

        let closed_connections = self.registry.close_all().await;
        if !self.registry.wait_until_empty(self.config.close_grace).await {
            warn!("Some connections did not close in time");
        }
        let lingering_connections = self.registry.count().await;

        self.join_task(&self.acceptor_task, "acceptor").await;

        let snapshot = self.monitor.snapshot();
        info!(
            dispatched = snapshot.dispatched,
            last_command = ?snapshot.current_command.as_ref().map(|t| t.to_string()),
            discarded = discarded_commands,
            connections = closed_connections,
            "Server shutdown complete"
        );

        ShutdownReport {
            discarded_commands,
            closed_connections,
            lingering_connections,
        }
    }

    async fn join_task(&self, slot: &Mutex<Option<JoinHandle<()>>>, name: &str) {
        let handle = slot.lock().ok().and_then(|mut guard| guard.take());
        let Some(mut handle) = handle else {
            return;
        };

        match timeout(self.config.close_grace, &mut handle).await {
            Ok(Ok(())) => debug!("{} task finished", name),
            Ok(Err(e)) => warn!("{} task failed: {}", name, e),
            Err(_) => {
                warn!("{} task did not stop in {:?}, aborting", name, self.config.close_grace);
                handle.abort();
            }
        }
    }
}

/// Bind, serve until an operator signal, then shut down
pub async fn serve(
    config: RelayConfig,
    actuator: Arc<dyn Actuator>,
) -> Result<ShutdownReport, RelayError> {
    let server = RelayServer::start(config, actuator).await?;
    Ok(server.run_until_signal().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::RecordingActuator;
    use crate::command::CommandToken;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn test_config() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".into(),
            port: 0,
            read_timeout: Duration::from_secs(5),
            dispatch_poll: Duration::from_millis(10),
            dispatch_pause: Duration::from_millis(1),
            close_grace: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shutdown_with_nothing_connected() {
        let actuator = RecordingActuator::new();
        let server = RelayServer::start(test_config(), Arc::new(actuator.clone()))
            .await
            .unwrap();
        assert!(server.is_running());

        let report = server.shutdown().await;
        assert_eq!(report, ShutdownReport::default());
        assert!(!server.is_running());
        assert_eq!(actuator.calls(), vec!["stop"]);
        assert!(TcpStream::connect(server.local_addr()).await.is_err());
    }

    #[tokio::test]
    async fn test_second_shutdown_is_a_no_op() {
        let actuator = RecordingActuator::new();
        let server = RelayServer::start(test_config(), Arc::new(actuator.clone()))
            .await
            .unwrap();

        server.shutdown().await;
        let report = server.shutdown().await;

        assert_eq!(report, ShutdownReport::default());
        assert_eq!(actuator.count("stop"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections_and_empties_queue() {
        let actuator = RecordingActuator::new().with_delay(Duration::from_millis(200));
        let server = RelayServer::start(test_config(), Arc::new(actuator.clone()))
            .await
            .unwrap();

        let mut clients = Vec::new();
        for _ in 0..2 {
            clients.push(TcpStream::connect(server.local_addr()).await.unwrap());
        }
        timeout(Duration::from_secs(2), async {
            while server.registry().count().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // One in flight, the rest wait behind the slow actuator
        for token in ["STAND", "FORWARD", "LEFT", "DANCE"] {
            server.queue().push(CommandToken::from(token)).unwrap();
        }
        server.monitor().wait_for_dispatched(1).await.unwrap();

        let report = server.shutdown().await;
        assert_eq!(report.closed_connections, 2);
        assert_eq!(report.lingering_connections, 0);
        assert_eq!(report.discarded_commands, 3);
        assert!(server.queue().is_empty());
        assert_eq!(actuator.calls(), vec!["stand", "stop"]);

        for mut client in clients {
            let mut buf = [0u8; 4];
            assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
        }
    }

    #[tokio::test]
    async fn test_start_fails_when_port_taken() {
        let first = RelayServer::start(test_config(), Arc::new(RecordingActuator::new()))
            .await
            .unwrap();
        let config = RelayConfig {
            port: first.local_addr().port(),
            ..test_config()
        };

        let err = RelayServer::start(config, Arc::new(RecordingActuator::new()))
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, RelayError::Bind { .. }));
        first.shutdown().await;
    }

    #[tokio::test]
    async fn test_final_stop_follows_in_flight_movement() {
        let actuator = RecordingActuator::new().with_delay(Duration::from_millis(150));
        let server = RelayServer::start(test_config(), Arc::new(actuator.clone()))
            .await
            .unwrap();

        server.queue().push(CommandToken::from("FORWARD")).unwrap();
        server.monitor().wait_for_dispatched(1).await.unwrap();
        server.shutdown().await;

        assert_eq!(actuator.calls(), vec!["move_forward", "stop"]);
    }
}
