//! Advisory platform probes.
//!
//! # Responsibilities
//! - Detect whether IPv6 is usable on this host
//! - Read the IPv6 dual-stack default (`net.ipv6.bindv6only`)
//! - Read the maximum listen backlog (`net.core.somaxconn`)
//! - Read the 1-minute load average
//!
//! # Design Decisions
//! - Every probe degrades gracefully: a missing signal yields the
//!   conservative answer instead of an error

use std::net::{Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::schema::DEFAULT_BACKLOG;

const BINDV6ONLY_PATH: &str = "/proc/sys/net/ipv6/bindv6only";
const SOMAXCONN_PATH: &str = "/proc/sys/net/core/somaxconn";

/// Whether an IPv6 stream socket can be created and bound to loopback.
pub fn has_ipv6() -> bool {
    let socket = match Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP)) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let loopback = SocketAddr::from((Ipv6Addr::LOCALHOST, 0));
    socket.bind(&loopback.into()).is_ok()
}

/// Whether IPv6 sockets accept IPv4-mapped traffic by default.
///
/// Falls back to `false` when the platform does not expose the setting.
pub fn dual_stack_default() -> bool {
    std::fs::read_to_string(BINDV6ONLY_PATH)
        .ok()
        .and_then(|raw| parse_bindv6only(&raw))
        .unwrap_or(false)
}

/// `bindv6only = 0` means IPv6 sockets are dual-stack.
fn parse_bindv6only(raw: &str) -> Option<bool> {
    match raw.trim() {
        "0" => Some(true),
        "1" => Some(false),
        _ => None,
    }
}

/// Maximum queued connections allowed by the platform.
pub fn system_backlog() -> u32 {
    std::fs::read_to_string(SOMAXCONN_PATH)
        .ok()
        .and_then(|raw| parse_somaxconn(&raw))
        .unwrap_or(DEFAULT_BACKLOG)
}

fn parse_somaxconn(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// The current 1-minute load average, if the platform reports one.
#[cfg(unix)]
pub fn load_average() -> Option<f64> {
    let mut samples = [0f64; 3];
    // SAFETY: `samples` has room for the three values requested.
    let n = unsafe { libc::getloadavg(samples.as_mut_ptr(), 3) };
    if n >= 1 && samples[0].is_finite() {
        Some(samples[0])
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn load_average() -> Option<f64> {
    None
}
