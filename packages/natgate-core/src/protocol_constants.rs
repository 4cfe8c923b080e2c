//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (UPnP Device
//! Architecture, SSDP, IGD WAN connection services) and changing them would
//! break protocol compliance.

use std::net::Ipv4Addr;

// ─────────────────────────────────────────────────────────────────────────────
// SSDP (Simple Service Discovery Protocol)
// ─────────────────────────────────────────────────────────────────────────────

/// Standard SSDP multicast group (IPv4).
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Standard SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Value of the `MAN` header. Always sent quoted.
pub const SSDP_MAN_DISCOVER: &str = "ssdp:discover";

/// Default search target: every root device answers it, including gateways.
pub const DEFAULT_SEARCH_TARGET: &str = "upnp:rootdevice";

/// Default `MX` value (maximum response delay in seconds).
pub const DEFAULT_MX_SECS: u8 = 3;

/// Grace period added to `MX` before the discovery socket gives up.
///
/// Devices may answer at any point up to `MX` seconds; the grace covers
/// network transit of the reply.
pub const SSDP_RECV_GRACE_MS: u64 = 1000;

/// UPnP 1.0 recommends a TTL of 4 for SSDP multicast.
pub const SSDP_MULTICAST_TTL: u32 = 4;

/// Maximum SSDP datagram size we accept.
pub const SSDP_MAX_DATAGRAM: usize = 2048;

// ─────────────────────────────────────────────────────────────────────────────
// Device Description
// ─────────────────────────────────────────────────────────────────────────────

/// XML namespace of UPnP device description documents.
pub const DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";

/// Timeout for fetching a device description (seconds).
pub const DESCRIPTION_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP/SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.1 encoding style required by UPnP control.
pub const SOAP_ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Content type for UPnP control requests.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// IGD Port Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Lease duration sent with `AddPortMapping`. Zero requests a permanent mapping.
pub const PERMANENT_LEASE_DURATION: u32 = 0;

/// Default `NewPortMappingDescription` shown in the router's mapping table.
pub const DEFAULT_MAPPING_DESCRIPTION: &str = "natgate";
