//! Handler process supervision.
//!
//! # Responsibilities
//! - Spawn the handler command with the connection as stdin and stdout
//! - Track every live handler by process id
//! - Reap exited handlers, one per call, without blocking
//! - Terminate and wait for every handler on shutdown
//!
//! # Design Decisions
//! - The daemon's copies of the connection descriptor are closed right
//!   after spawn; the child holds the only live reference
//! - Exit notification is SIGCHLD; each notification is followed by a
//!   `try_wait` sweep over the table, so coalesced signals lose nothing.
//!   One sweep collects every exited handler; later reaps drain the queue
//! - Children are spawned with kill-on-drop, so a record dropped on an
//!   abnormal path never leaks a running process

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::config::HandlerConfig;

/// Failure to launch a handler for one connection.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to prepare connection descriptor: {0}")]
    Descriptor(#[source] io::Error),

    #[error("failed to execute `{command}`: {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("spawned `{0}` but no process id was reported")]
    MissingPid(String),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to install child exit notification: {0}")]
    ExitNotification(#[source] io::Error),
}

/// One spawned handler.
#[derive(Debug)]
pub struct HandlerProcess {
    pid: u32,
    command: String,
    args: Vec<String>,
    peer: SocketAddr,
    started: Instant,
    child: Child,
}

impl HandlerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Owner of the live process table.
#[derive(Debug)]
pub struct Supervisor {
    handler: HandlerConfig,
    table: HashMap<u32, HandlerProcess>,
    /// Handlers already removed from the table, not yet reported by `reap`.
    reaped: VecDeque<u32>,
    exits: Signal,
}

impl Supervisor {
    /// Create a supervisor and start listening for child exits.
    ///
    /// Must be called from within a Tokio runtime, before the first spawn.
    pub fn new(handler: HandlerConfig) -> Result<Self, SupervisorError> {
        let exits = signal(SignalKind::child()).map_err(SupervisorError::ExitNotification)?;
        Ok(Self {
            handler,
            table: HashMap::new(),
            reaped: VecDeque::new(),
            exits,
        })
    }

    /// Launch the handler on an accepted connection.
    ///
    /// The connection becomes the child's stdin and stdout; stderr is
    /// inherited from the daemon.
    pub fn spawn(&mut self, conn: TcpStream, peer: SocketAddr) -> Result<u32, SpawnError> {
        conn.set_nonblocking(false).map_err(SpawnError::Descriptor)?;
        let stdin = OwnedFd::from(conn);
        let stdout = stdin.try_clone().map_err(SpawnError::Descriptor)?;

        let mut command = Command::new(&self.handler.command);
        command
            .args(&self.handler.args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let spawned = command.spawn();
        // The command holds the daemon's only copies of the connection.
        drop(command);

        let child = spawned.map_err(|source| SpawnError::Exec {
            command: self.handler.to_string(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::MissingPid(self.handler.command.clone()))?;

        tracing::debug!(pid, peer = %peer, command = %self.handler, "Handler process spawned");

        self.table.insert(
            pid,
            HandlerProcess {
                pid,
                command: self.handler.command.clone(),
                args: self.handler.args.clone(),
                peer,
                started: Instant::now(),
                child,
            },
        );
        Ok(pid)
    }

    /// Remove and return one handler that has exited, if any.
    ///
    /// When nothing is queued the whole table is swept once and every
    /// exited handler is removed; the rest of them are returned by the
    /// following calls without another sweep.
    pub fn reap(&mut self) -> Option<u32> {
        if self.reaped.is_empty() {
            self.sweep();
        }
        self.reaped.pop_front()
    }

    fn sweep(&mut self) {
        let mut exited = Vec::new();
        for (pid, process) in self.table.iter_mut() {
            match process.child.try_wait() {
                Ok(Some(status)) => exited.push((*pid, Ok(status))),
                Ok(None) => {}
                Err(e) => exited.push((*pid, Err(e))),
            }
        }

        for (pid, status) in exited {
            let Some(process) = self.table.remove(&pid) else {
                continue;
            };
            match status {
                Ok(status) => tracing::debug!(
                    pid,
                    peer = %process.peer,
                    status = %status,
                    elapsed_ms = process.uptime().as_millis() as u64,
                    "Handler process exited"
                ),
                Err(e) => tracing::warn!(pid, error = %e, "Lost track of handler process"),
            }
            self.reaped.push_back(pid);
        }
    }

    /// Wait for the next child exit notification.
    ///
    /// A notification may cover several exits or none of ours; callers
    /// follow it with [`Supervisor::reap`] until it returns `None`.
    pub async fn exited(&mut self) {
        if self.exits.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    /// Send SIGTERM to every live handler and wait for each to exit.
    ///
    /// There is no deadline: a handler ignoring SIGTERM stalls shutdown.
    pub async fn shutdown(&mut self) -> usize {
        let processes: Vec<HandlerProcess> = self.table.drain().map(|(_, p)| p).collect();

        for process in &processes {
            if let Err(e) = terminate(process.pid) {
                tracing::debug!(pid = process.pid, error = %e, "Failed to signal handler process");
            }
        }

        let terminated = processes.len();
        for mut process in processes {
            match process.child.wait().await {
                Ok(status) => tracing::info!(pid = process.pid, status = %status, "Handler process terminated"),
                Err(e) => tracing::warn!(pid = process.pid, error = %e, "Failed to wait for handler process"),
            }
        }
        terminated
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.table.contains_key(&pid)
    }

    pub fn get(&self, pid: u32) -> Option<&HandlerProcess> {
        self.table.get(&pid)
    }
}

fn terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// A connected (server side, client side) pair over loopback.
    fn connection() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (server, peer, client)
    }

    /// Whether `pid` has exited but not been waited for yet.
    fn exited_unreaped(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| stat.rsplit_once(") ").map(|(_, rest)| rest.starts_with('Z')))
            .unwrap_or(false)
    }

    async fn reap_one(supervisor: &mut Supervisor) -> u32 {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(pid) = supervisor.reap() {
                    return pid;
                }
                supervisor.exited().await;
            }
        })
        .await
        .expect("handler exit was not observed")
    }

    #[tokio::test]
    async fn spawn_wires_connection_to_stdio() {
        let mut supervisor = Supervisor::new(HandlerConfig::new("echo", ["hello"])).unwrap();
        let (server, peer, mut client) = connection();

        let pid = supervisor.spawn(server, peer).unwrap();
        assert!(supervisor.contains(pid));
        assert_eq!(supervisor.get(pid).unwrap().command(), "echo");
        assert_eq!(supervisor.get(pid).unwrap().args(), ["hello".to_string()]);

        let output = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        })
        .await
        .unwrap();
        // EOF proves the daemon no longer holds the connection.
        assert_eq!(output, b"hello\n");

        assert_eq!(reap_one(&mut supervisor).await, pid);
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn stdin_reaches_handler() {
        let mut supervisor = Supervisor::new(HandlerConfig::new("cat", Vec::<String>::new())).unwrap();
        let (server, peer, mut client) = connection();
        let pid = supervisor.spawn(server, peer).unwrap();

        let output = tokio::task::spawn_blocking(move || {
            client.write_all(b"ping\n").unwrap();
            client.shutdown(std::net::Shutdown::Write).unwrap();
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        })
        .await
        .unwrap();
        assert_eq!(output, b"ping\n");
        assert_eq!(reap_one(&mut supervisor).await, pid);
    }

    #[tokio::test]
    async fn reap_without_exits_is_a_no_op() {
        let mut supervisor = Supervisor::new(HandlerConfig::new("sleep", ["30"])).unwrap();
        assert_eq!(supervisor.reap(), None);

        let (server, peer, _client) = connection();
        supervisor.spawn(server, peer).unwrap();
        assert_eq!(supervisor.reap(), None);
        assert_eq!(supervisor.len(), 1);

        assert_eq!(supervisor.shutdown().await, 1);
    }

    #[tokio::test]
    async fn one_sweep_collects_every_exit() {
        let mut supervisor = Supervisor::new(HandlerConfig::new("echo", ["bye"])).unwrap();
        let mut pids = Vec::new();
        let mut clients = Vec::new();
        for _ in 0..3 {
            let (server, peer, client) = connection();
            pids.push(supervisor.spawn(server, peer).unwrap());
            clients.push(client);
        }

        drop(clients);
        tokio::time::timeout(Duration::from_secs(10), async {
            while !pids.iter().all(|&pid| exited_unreaped(pid)) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("handlers did not exit");

        let mut reaped = vec![supervisor.reap().unwrap()];
        // The first reap already removed every exited handler.
        assert!(supervisor.is_empty());
        while let Some(pid) = supervisor.reap() {
            reaped.push(pid);
        }

        reaped.sort_unstable();
        pids.sort_unstable();
        assert_eq!(reaped, pids);
        assert_eq!(supervisor.reap(), None);
    }

    #[tokio::test]
    async fn exec_failure_is_reported() {
        let mut supervisor =
            Supervisor::new(HandlerConfig::new("/nonexistent/handler", Vec::<String>::new())).unwrap();
        let (server, peer, _client) = connection();

        let err = supervisor.spawn(server, peer).unwrap_err();
        assert!(matches!(err, SpawnError::Exec { .. }));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn shutdown_terminates_everything() {
        let mut supervisor = Supervisor::new(HandlerConfig::new("sleep", ["30"])).unwrap();
        let mut clients = Vec::new();
        for _ in 0..3 {
            let (server, peer, client) = connection();
            supervisor.spawn(server, peer).unwrap();
            clients.push(client);
        }
        assert_eq!(supervisor.len(), 3);

        let terminated = tokio::time::timeout(Duration::from_secs(10), supervisor.shutdown())
            .await
            .expect("shutdown stalled");
        assert_eq!(terminated, 3);
        assert!(supervisor.is_empty());
    }
}
