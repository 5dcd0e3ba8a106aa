//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket_burst_dampener::admission::LoadSource;
use socket_burst_dampener::config::{Family, HandlerConfig};
use socket_burst_dampener::{Daemon, DaemonConfig, DaemonError, Shutdown, ShutdownSummary};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Generous bound for anything that should happen "soon".
pub const PATIENCE: Duration = Duration::from_secs(10);

/// How long to watch for something that must not happen.
pub const QUIET: Duration = Duration::from_millis(500);

/// A load source stuck at one value.
pub struct FixedLoad(pub f64);

impl LoadSource for FixedLoad {
    fn one_minute(&self) -> Option<f64> {
        Some(self.0)
    }
}

/// Loopback IPv4 config on an ephemeral port.
pub fn config(command: &str, args: &[&str], processes: usize) -> DaemonConfig {
    let mut config = DaemonConfig {
        handler: HandlerConfig::new(command, args.iter().copied()),
        ..Default::default()
    };
    config.listener.address = Some("127.0.0.1".to_string());
    config.listener.family = Family::Ipv4;
    config.admission.max_processes = processes;
    config
}

/// A daemon running on a background task.
pub struct Running {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<ShutdownSummary, DaemonError>>,
}

impl Running {
    pub async fn start(config: DaemonConfig) -> Self {
        Self::launch(Daemon::bind(&config).expect("daemon binds"))
    }

    pub async fn start_with_load(config: DaemonConfig, load: f64) -> Self {
        Self::launch(Daemon::bind_with_load(&config, Arc::new(FixedLoad(load))).expect("daemon binds"))
    }

    fn launch(daemon: Daemon) -> Self {
        let addr = daemon.local_addr().expect("at least one listener");
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        let task = tokio::spawn(daemon.run(signal));
        Self { addr, shutdown, task }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.expect("connect")
    }

    /// Trigger shutdown and wait for the drain to finish.
    pub async fn stop(self) -> ShutdownSummary {
        self.shutdown.trigger();
        tokio::time::timeout(PATIENCE, self.task)
            .await
            .expect("shutdown stalled")
            .expect("daemon task panicked")
            .expect("daemon failed")
    }
}

/// Read until EOF.
pub async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(PATIENCE, stream.read_to_end(&mut buf))
        .await
        .expect("handler never closed the connection")
        .expect("read failed");
    buf
}

/// Read exactly `len` bytes, or `None` if they do not arrive within `wait`.
pub async fn read_within(stream: &mut TcpStream, len: usize, wait: Duration) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; len];
    match tokio::time::timeout(wait, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Some(buf),
        Ok(Err(e)) => panic!("read failed: {e}"),
        Err(_) => None,
    }
}

/// Send a line and expect it echoed back by a `cat` handler.
pub async fn round_trip(stream: &mut TcpStream, line: &[u8]) {
    stream.write_all(line).await.expect("write");
    let echoed = read_within(stream, line.len(), PATIENCE).await;
    assert_eq!(echoed.as_deref(), Some(line));
}
