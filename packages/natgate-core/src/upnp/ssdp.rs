//! SSDP-based gateway discovery.
//!
//! Sends a single M-SEARCH to the multicast group and reads exactly one
//! reply. The first device to answer wins: there is no listener loop and no
//! disambiguation between several gateways.
//!
//! The socket sends and receives on the same port since devices reply
//! unicast back to the sender.

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::protocol_constants::{
    DEFAULT_MX_SECS, DEFAULT_SEARCH_TARGET, SSDP_MAN_DISCOVER, SSDP_MAX_DATAGRAM,
    SSDP_MULTICAST_ADDR, SSDP_MULTICAST_TTL, SSDP_PORT, SSDP_RECV_GRACE_MS,
};

/// URL of an XML device description, taken from the SSDP `LOCATION` header.
///
/// Only valid until the device re-announces, so it is never cached across
/// sessions.
pub type DeviceLocation = Url;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during SSDP discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to create or bind the UDP socket.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to join the multicast group.
    #[error("failed to join multicast group {0}: {1}")]
    JoinMulticast(IpAddr, #[source] std::io::Error),

    /// Failed to send the M-SEARCH datagram.
    #[error("failed to send SSDP search: {0}")]
    SendSearch(#[source] std::io::Error),

    /// Socket error while waiting for a reply.
    #[error("failed to receive SSDP response: {0}")]
    Receive(#[source] std::io::Error),

    /// No device answered before the socket timeout.
    #[error("no SSDP response within {waited_ms}ms")]
    Timeout {
        /// How long the socket waited.
        waited_ms: u64,
    },

    /// The reply had no `LOCATION` header.
    #[error("SSDP response has no LOCATION header")]
    MissingLocation,

    /// The `LOCATION` header value is not a valid URL.
    #[error("invalid LOCATION '{value}': {source}")]
    InvalidLocation {
        /// Raw header value.
        value: String,
        /// URL parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Checks if `s` starts with `prefix` (ASCII case-insensitive, no allocation).
#[inline]
fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// M-SEARCH Request
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of one M-SEARCH query.
///
/// The `MAN` header is always `"ssdp:discover"` and is not configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MSearchRequest {
    /// Multicast group and port the query is sent to (also the `HOST` header).
    pub endpoint: SocketAddr,
    /// Search target (`ST` header).
    pub search_target: String,
    /// Maximum response delay in seconds (`MX` header).
    pub mx: u8,
}

impl Default for MSearchRequest {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::new(IpAddr::V4(SSDP_MULTICAST_ADDR), SSDP_PORT),
            search_target: DEFAULT_SEARCH_TARGET.to_string(),
            mx: DEFAULT_MX_SECS,
        }
    }
}

impl MSearchRequest {
    /// Creates a request for an explicit endpoint, search target and `MX`.
    pub fn new(endpoint: SocketAddr, search_target: impl Into<String>, mx: u8) -> Self {
        Self {
            endpoint,
            search_target: search_target.into(),
            mx,
        }
    }

    /// Builds the M-SEARCH datagram text.
    #[must_use]
    pub fn to_message(&self) -> String {
        format!(
            "M-SEARCH * HTTP/1.1\r\n\
             MX: {}\r\n\
             HOST: {}\r\n\
             MAN: \"{}\"\r\n\
             ST: {}\r\n\r\n",
            self.mx, self.endpoint, SSDP_MAN_DISCOVER, self.search_target
        )
    }

    /// How long to block waiting for a reply: `MX` plus transit grace.
    #[must_use]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.mx)) + Duration::from_millis(SSDP_RECV_GRACE_MS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the discovery socket.
///
/// Binds an ephemeral port on the wildcard address of the endpoint's family
/// and joins the endpoint's group when it is a multicast address. Unicast
/// endpoints are sent to directly.
fn create_socket(endpoint: SocketAddr) -> DiscoveryResult<UdpSocket> {
    let socket = Socket::new(
        Domain::for_address(endpoint),
        Type::DGRAM,
        Some(Protocol::UDP),
    )
    .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR: {}", e);
    }

    let bind_addr = match endpoint {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    match endpoint.ip() {
        IpAddr::V4(group) => {
            if let Err(e) = socket.set_multicast_ttl_v4(SSDP_MULTICAST_TTL) {
                log::warn!("[SSDP] Failed to set multicast TTL: {}", e);
            }
            if group.is_multicast() {
                socket
                    .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                    .map_err(|e| DiscoveryError::JoinMulticast(endpoint.ip(), e))?;
            }
        }
        IpAddr::V6(group) => {
            if let Err(e) = socket.set_multicast_hops_v6(SSDP_MULTICAST_TTL) {
                log::warn!("[SSDP] Failed to set multicast hops: {}", e);
            }
            if group.is_multicast() {
                socket
                    .join_multicast_v6(&group, 0)
                    .map_err(|e| DiscoveryError::JoinMulticast(endpoint.ip(), e))?;
            }
        }
    }

    Ok(socket.into())
}

/// Extracts the `LOCATION` URL from an SSDP response.
///
/// The header key is matched case-insensitively on the first line that
/// starts with `location:`; the value is trimmed before URL parsing.
pub fn parse_location(response: &str) -> DiscoveryResult<DeviceLocation> {
    const KEY: &str = "location:";

    let value = response
        .split(['\r', '\n'])
        .find(|line| starts_with_ignore_ascii_case(line, KEY))
        .map(|line| line[KEY.len()..].trim())
        .ok_or(DiscoveryError::MissingLocation)?;

    Url::parse(value).map_err(|source| DiscoveryError::InvalidLocation {
        value: value.to_string(),
        source,
    })
}

/// Discovers a device description location with one M-SEARCH round-trip.
///
/// Blocks until the first datagram arrives or [`MSearchRequest::recv_timeout`]
/// elapses. The socket is closed before returning.
pub fn discover(request: &MSearchRequest) -> DiscoveryResult<DeviceLocation> {
    let socket = create_socket(request.endpoint)?;
    let timeout = request.recv_timeout();
    socket
        .set_read_timeout(Some(timeout))
        .map_err(DiscoveryError::SocketBind)?;

    let msg = request.to_message();
    log::debug!(
        "[SSDP] Sending M-SEARCH to {} (ST: {}, MX: {})",
        request.endpoint,
        request.search_target,
        request.mx
    );
    socket
        .send_to(msg.as_bytes(), request.endpoint)
        .map_err(DiscoveryError::SendSearch)?;

    let start = Instant::now();
    let mut buf = [0u8; SSDP_MAX_DATAGRAM];
    let (amt, src) = match socket.recv_from(&mut buf) {
        Ok(received) => received,
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            log::debug!("[SSDP] No response after {:?}", start.elapsed());
            return Err(DiscoveryError::Timeout {
                waited_ms: timeout.as_millis() as u64,
            });
        }
        Err(e) => return Err(DiscoveryError::Receive(e)),
    };
    drop(socket);

    let response = String::from_utf8_lossy(&buf[..amt]);
    log::trace!("[SSDP] Response from {}: {}", src, response);

    let location = parse_location(&response)?;
    log::info!(
        "[SSDP] {} answered in {}ms, location {}",
        src,
        start.elapsed().as_millis(),
        location
    );
    Ok(location)
}
