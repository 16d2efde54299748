//! Connection to the relay

use anyhow::{anyhow, Result};
use hexapod_shared::{protocol::PING_BYTE, Command, Frame};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, warn};

/// Same command is not resent within this window
pub const MIN_COMMAND_INTERVAL: Duration = Duration::from_millis(100);

/// The relay has no framing, so frames written back to back could be read
/// as one. Keep them apart.
pub const FRAME_GAP: Duration = Duration::from_millis(50);

struct Writer {
    half: OwnedWriteHalf,
    last_frame_at: Option<Instant>,
}

/// Live connection to the relay
pub struct RobotLink {
    writer: Mutex<Writer>,
    last_sent: StdMutex<Option<(Command, Instant)>>,
    last_seen: Arc<StdMutex<Instant>>,
    connected: watch::Receiver<bool>,
    reader_task: JoinHandle<()>,
}

impl RobotLink {
    /// Connect to the relay at `addr`
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow!("Connection timeout: robot at {} not responding", addr))?
            .map_err(|e| anyhow!("Failed to connect to {}: {}", addr, e))?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (connected_tx, connected) = watch::channel(true);
        let last_seen = Arc::new(StdMutex::new(Instant::now()));

        let reader_task = tokio::spawn(read_loop(reader, last_seen.clone(), connected_tx));

        Ok(Self {
            writer: Mutex::new(Writer {
                half: writer,
                last_frame_at: None,
            }),
            last_sent: StdMutex::new(None),
            last_seen,
            connected,
            reader_task,
        })
    }

    /// Send a command. Returns `false` if it was suppressed as a duplicate.
    pub async fn send(&self, command: Command) -> Result<bool> {
        let now = Instant::now();
        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(|p| p.into_inner());
            if is_duplicate(*last_sent, command, now) {
                return Ok(false);
            }
            *last_sent = Some((command, now));
        }

        debug!("Sending command: {}", command);
        self.write_frame(&Frame::command(command)).await?;
        Ok(true)
    }

    /// Send a ping frame
    pub async fn ping(&self) -> Result<()> {
        self.write_frame(&Frame::Ping).await
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(anyhow!("Connection lost"));
        }

        let mut writer = self.writer.lock().await;
        if let Some(last) = writer.last_frame_at {
            sleep_until(last + FRAME_GAP).await;
        }
        writer.half.write_all(&frame.encode()).await?;
        writer.last_frame_at = Some(Instant::now());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Time since the relay last sent a ping reply or probe
    pub fn since_last_seen(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| seen.elapsed())
            .unwrap_or_default()
    }

    /// Resolves once the relay closes the connection
    pub async fn closed(&self) {
        let mut connected = self.connected.clone();
        let _ = connected.wait_for(|up| !*up).await;
    }

    /// Close our side of the connection
    pub async fn shutdown(self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.half.shutdown().await;
        drop(writer);
        self.reader_task.abort();
    }
}

/// Whether sending `command` at `now` repeats the previous send too soon
fn is_duplicate(last: Option<(Command, Instant)>, command: Command, now: Instant) -> bool {
    match last {
        Some((previous, at)) => previous == command && now.duration_since(at) < MIN_COMMAND_INTERVAL,
        None => false,
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    last_seen: Arc<StdMutex<Instant>>,
    connected: watch::Sender<bool>,
) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Relay closed the connection");
                break;
            }
            Ok(n) => {
                if buf[..n].contains(&PING_BYTE) {
                    if let Ok(mut seen) = last_seen.lock() {
                        *seen = Instant::now();
                    }
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                break;
            }
        }
    }
    connected.send_replace(false);
}
