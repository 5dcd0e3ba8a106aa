//! Listener set: resolution, dual-stack reconciliation and binding.
//!
//! # Responsibilities
//! - Resolve the configured address/port into TCP bind candidates
//! - Drop redundant IPv4 candidates when IPv6 sockets are dual-stack
//! - Bind one non-blocking listening socket per surviving candidate
//! - Report readability and accept one connection at a time
//!
//! # Design Decisions
//! - A failed candidate is logged and skipped; only an empty set is fatal
//! - Sockets are registered with the reactor once, at bind time. Whether
//!   they are serviced is decided by the admission controller, which only
//!   polls [`ListenerSet::readable`] while accepting
//! - Readiness is kept until an accept returns `WouldBlock`, so a pending
//!   connection survives a pause and is picked up on resume

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::task::Poll;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::config::{Family, ListenerConfig};
use crate::net::platform;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address could not be resolved.
    #[error("failed to resolve {address}:{port}: {source}")]
    Resolve {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Every candidate failed to bind or listen.
    #[error("no listening socket could be bound for {address}:{port}")]
    NoListeners { address: String, port: u16 },
}

/// Address family of a bound socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl From<&SocketAddr> for AddressFamily {
    fn from(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Ipv6
        }
    }
}

/// A bound, listening, non-blocking socket.
#[derive(Debug)]
pub struct ListenerSocket {
    family: AddressFamily,
    local_addr: SocketAddr,
    inner: AsyncFd<TcpListener>,
}

impl ListenerSocket {
    /// Create, configure, bind and listen on one candidate.
    ///
    /// On error the partially created socket is dropped (closed) here.
    fn open(candidate: SocketAddr, family: Family, backlog: u32) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(candidate), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        if candidate.is_ipv6() && family == Family::Ipv6 {
            socket.set_only_v6(true)?;
        }
        socket.bind(&candidate.into())?;
        socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;
        let inner = AsyncFd::with_interest(listener, Interest::READABLE)?;

        Ok(Self {
            family: AddressFamily::from(&local_addr),
            local_addr,
            inner,
        })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending connection without suspending.
    ///
    /// Returns `None` when nothing is pending (a spurious wakeup); the
    /// readiness flag is cleared in that case. On any other error the flag
    /// is kept, so the connection still queued is retried later.
    pub async fn try_accept(&self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        std::future::poll_fn(|cx| match self.inner.poll_read_ready(cx) {
            Poll::Ready(Ok(mut guard)) => match guard.try_io(|fd| fd.get_ref().accept()) {
                Ok(result) => Poll::Ready(Some(result)),
                Err(_would_block) => Poll::Ready(None),
            },
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }
}

/// The set of sockets the daemon accepts on.
#[derive(Debug)]
pub struct ListenerSet {
    sockets: Vec<ListenerSocket>,
    /// Index polled first on the next readiness wait.
    next: usize,
}

impl ListenerSet {
    /// Resolve and bind every candidate for the configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let ipv6_available = platform::has_ipv6();
        let candidates = resolve(config, ipv6_available)?;
        let candidates = reconcile_dual_stack(candidates, ipv6_available, platform::dual_stack_default());
        Self::bind_candidates(&candidates, config)
    }

    /// Bind every candidate, skipping the ones that fail.
    ///
    /// Fails only when no candidate could be bound.
    pub fn bind_candidates(candidates: &[SocketAddr], config: &ListenerConfig) -> Result<Self, ListenerError> {
        let mut sockets = Vec::with_capacity(candidates.len());
        for &candidate in candidates {
            match ListenerSocket::open(candidate, config.family, config.backlog) {
                Ok(socket) => {
                    tracing::info!(
                        address = %socket.local_addr(),
                        backlog = config.backlog,
                        "Listener bound"
                    );
                    sockets.push(socket);
                }
                Err(e) => {
                    tracing::warn!(candidate = %candidate, error = %e, "Failed to bind candidate, skipping");
                }
            }
        }

        if sockets.is_empty() {
            return Err(ListenerError::NoListeners {
                address: display_address(config),
                port: config.port,
            });
        }

        Ok(Self { sockets, next: 0 })
    }

    /// Local address of the first bound socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.sockets.first().map(ListenerSocket::local_addr)
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets.iter().map(ListenerSocket::local_addr).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ListenerSocket> {
        self.sockets.iter()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Wait until any socket is readable and return its index.
    ///
    /// Polling starts after the socket serviced last, so a busy listener
    /// cannot starve the others.
    pub async fn readable(&mut self) -> io::Result<usize> {
        let count = self.sockets.len();
        if count == 0 {
            return std::future::pending().await;
        }

        let start = self.next % count;
        let sockets = &self.sockets;
        let index = std::future::poll_fn(|cx| {
            for offset in 0..count {
                let index = (start + offset) % count;
                match sockets[index].inner.poll_read_ready(cx) {
                    // Guard dropped without clearing: readiness is consumed by accept.
                    Poll::Ready(Ok(_guard)) => return Poll::Ready(Ok(index)),
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {}
                }
            }
            Poll::Pending
        })
        .await?;

        self.next = (index + 1) % count;
        Ok(index)
    }

    /// Accept one pending connection on the socket at `index`.
    pub async fn try_accept(&self, index: usize) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        match self.sockets.get(index) {
            Some(socket) => socket.try_accept().await,
            None => None,
        }
    }

    /// Close every socket, returning how many were closed.
    pub fn close(&mut self) -> usize {
        let closed = self.sockets.len();
        for socket in self.sockets.drain(..) {
            let address = socket.local_addr;
            drop(socket.inner.into_inner());
            tracing::debug!(address = %address, "Listener closed");
        }
        self.next = 0;
        closed
    }
}

/// Resolve the configuration into bind candidates, TCP only.
///
/// Without an address this yields the wildcard address of each usable
/// family, the same set a passive lookup produces.
pub fn resolve(config: &ListenerConfig, ipv6_available: bool) -> Result<Vec<SocketAddr>, ListenerError> {
    let resolved: Vec<SocketAddr> = match config.address.as_deref() {
        None => {
            let mut wildcards = vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))];
            if ipv6_available {
                wildcards.push(SocketAddr::from((Ipv6Addr::UNSPECIFIED, config.port)));
            }
            wildcards
        }
        Some(address) => {
            let host = address.trim_start_matches('[').trim_end_matches(']');
            (host, config.port)
                .to_socket_addrs()
                .map_err(|source| ListenerError::Resolve {
                    address: address.to_string(),
                    port: config.port,
                    source,
                })?
                .collect()
        }
    };

    let mut seen = HashSet::new();
    let candidates = resolved
        .into_iter()
        .filter(|addr| config.family.admits(addr))
        .filter(|addr| seen.insert(*addr))
        .collect::<Vec<_>>();

    tracing::debug!(candidates = ?candidates, family = %config.family, "Resolved bind candidates");
    Ok(candidates)
}

/// Keep only IPv6 candidates when IPv6 sockets also accept IPv4.
///
/// Binding both families to the same port fails with address-in-use on
/// a dual-stack host, so the IPv4 candidates are redundant there.
pub fn reconcile_dual_stack(candidates: Vec<SocketAddr>, ipv6_available: bool, dual_stack: bool) -> Vec<SocketAddr> {
    if candidates.len() <= 1 || !ipv6_available || !dual_stack {
        return candidates;
    }
    if !candidates.iter().any(SocketAddr::is_ipv6) {
        return candidates;
    }
    candidates.into_iter().filter(SocketAddr::is_ipv6).collect()
}

fn display_address(config: &ListenerConfig) -> String {
    config.address.clone().unwrap_or_else(|| "*".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn config(address: Option<&str>, family: Family) -> ListenerConfig {
        ListenerConfig {
            address: address.map(str::to_string),
            family,
            ..Default::default()
        }
    }

    #[test]
    fn wildcard_resolution_follows_ipv6_availability() {
        let both = resolve(&config(None, Family::Any), true).unwrap();
        assert_eq!(both, vec![addr("0.0.0.0:0"), addr("[::]:0")]);

        let v4_only = resolve(&config(None, Family::Any), false).unwrap();
        assert_eq!(v4_only, vec![addr("0.0.0.0:0")]);
    }

    #[test]
    fn resolution_applies_family_preference() {
        let v4 = resolve(&config(None, Family::Ipv4), true).unwrap();
        assert_eq!(v4, vec![addr("0.0.0.0:0")]);

        let v6 = resolve(&config(None, Family::Ipv6), true).unwrap();
        assert_eq!(v6, vec![addr("[::]:0")]);
    }

    #[test]
    fn resolves_literal_addresses() {
        let v4 = resolve(&config(Some("127.0.0.1"), Family::Any), true).unwrap();
        assert_eq!(v4, vec![addr("127.0.0.1:0")]);

        let v6 = resolve(&config(Some("[::1]"), Family::Any), true).unwrap();
        assert_eq!(v6, vec![addr("[::1]:0")]);
    }

    #[test]
    fn unresolvable_address_is_an_error() {
        let err = resolve(&config(Some("no such host.invalid"), Family::Any), true).unwrap_err();
        assert!(matches!(err, ListenerError::Resolve { .. }));
    }

    #[test]
    fn dual_stack_drops_ipv4_candidates() {
        let candidates = vec![addr("0.0.0.0:80"), addr("[::]:80")];
        assert_eq!(reconcile_dual_stack(candidates, true, true), vec![addr("[::]:80")]);
    }

    #[test]
    fn no_reconciliation_without_dual_stack() {
        let candidates = vec![addr("0.0.0.0:80"), addr("[::]:80")];
        assert_eq!(reconcile_dual_stack(candidates.clone(), true, false), candidates);
        assert_eq!(reconcile_dual_stack(candidates.clone(), false, true), candidates);
    }

    #[test]
    fn single_or_ipv4_only_candidates_are_kept() {
        let single = vec![addr("127.0.0.1:80")];
        assert_eq!(reconcile_dual_stack(single.clone(), true, true), single);

        let v4s = vec![addr("127.0.0.1:80"), addr("10.0.0.1:80")];
        assert_eq!(reconcile_dual_stack(v4s.clone(), true, true), v4s);
    }

    #[tokio::test]
    async fn binds_loopback_ephemeral_port() {
        let mut set = ListenerSet::bind(&config(Some("127.0.0.1"), Family::Ipv4)).unwrap();
        let local = set.local_addr().unwrap();
        assert_eq!(local.ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(local.port(), 0);
        assert_eq!(set.iter().next().unwrap().family(), AddressFamily::Ipv4);

        assert_eq!(set.close(), 1);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn bind_failure_on_every_candidate_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut cfg = config(Some("127.0.0.1"), Family::Ipv4);
        cfg.port = port;
        // SO_REUSEADDR does not allow two listeners on one port.
        let err = ListenerSet::bind(&cfg).unwrap_err();
        assert!(matches!(err, ListenerError::NoListeners { .. }));
    }

    #[tokio::test]
    async fn failed_candidate_is_skipped() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken_addr = taken.local_addr().unwrap();

        let cfg = config(Some("127.0.0.1"), Family::Ipv4);
        let set = ListenerSet::bind_candidates(&[taken_addr, addr("127.0.0.1:0")], &cfg).unwrap();
        assert_eq!(set.len(), 1);
        let local = set.local_addr().unwrap();
        assert_eq!(local.ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(local.port(), taken_addr.port());
    }

    #[tokio::test]
    async fn ipv6_preference_refuses_ipv4_clients() {
        if !platform::has_ipv6() {
            return;
        }

        let v6_only = ListenerSet::bind_candidates(&[addr("[::]:0")], &config(None, Family::Ipv6)).unwrap();
        assert_eq!(v6_only.iter().next().unwrap().family(), AddressFamily::Ipv6);
        let port = v6_only.local_addr().unwrap().port();
        assert!(std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_err());
        assert!(std::net::TcpStream::connect((Ipv6Addr::LOCALHOST, port)).is_ok());

        if platform::dual_stack_default() {
            let any = ListenerSet::bind_candidates(&[addr("[::]:0")], &config(None, Family::Any)).unwrap();
            let port = any.local_addr().unwrap().port();
            assert!(std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_ok());
        }
    }

    #[tokio::test]
    async fn readable_then_accept() {
        let mut set = ListenerSet::bind(&config(Some("127.0.0.1"), Family::Ipv4)).unwrap();
        let local = set.local_addr().unwrap();

        let _client = tokio::net::TcpStream::connect(local).await.unwrap();
        let index = set.readable().await.unwrap();
        assert_eq!(index, 0);

        let (_stream, peer) = set.try_accept(index).await.unwrap().unwrap();
        assert!(peer.ip().is_loopback());

        // Nothing else is pending: a spurious accept yields nothing.
        assert!(set.try_accept(index).await.is_none());
    }
}
