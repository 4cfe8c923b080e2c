//! natgate core - UPnP Internet Gateway Device client.
//!
//! This crate discovers a NAT router on the local network, resolves its WAN
//! connection service and manages port mappings on it through SOAP.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`upnp`]: Protocol plumbing (SSDP discovery, device description, SOAP)
//! - [`mapping`]: Port mapping sessions built on top of the protocol layer
//! - [`context`]: Local address detection for the default internal client
//! - [`error`]: Centralized error types
//! - [`protocol_constants`]: Wire constants and defaults
//!
//! # Abstraction Traits
//!
//! The session layer depends on traits rather than on the network:
//!
//! - [`GatewayClient`](upnp::GatewayClient): Discovery plus SOAP invocation
//! - [`IpDetector`](context::IpDetector): Local IP detection
//!
//! [`UpnpClient`](upnp::UpnpClient) and [`LocalIpDetector`] are the defaults.
//!
//! # Example
//!
//! ```no_run
//! use natgate_core::{MappingRequest, PortMapper, Protocol};
//!
//! # fn main() -> natgate_core::MappingResult<()> {
//! let mapper = PortMapper::native()?;
//! let mapping = mapper.create(&MappingRequest::new(Protocol::Tcp, 8080))?;
//! println!("reachable at {}:{}", mapping.external_ip_address()?, mapping.external_port());
//! mapping.delete()?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod mapping;
pub mod protocol_constants;
pub mod upnp;

// Re-export commonly used types at the crate root
pub use context::{AddressFamily, IpDetector, LocalIpDetector, NetworkError, StaticIpDetector};
pub use error::{ErrorCode, MappingError, MappingResult};
pub use mapping::{
    MappingRequest, MappingState, ParseProtocolError, PortMapper, PortMapping, Protocol,
};
pub use upnp::{
    DescriptionError, DeviceLocation, DiscoveryError, GatewayClient, MSearchRequest,
    ServiceEndpoint, SoapAction, SoapError, UpnpClient, WanService,
};
