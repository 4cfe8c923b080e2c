//! UPnP Internet Gateway Device protocol plumbing.
//!
//! This module finds a gateway on the local network and speaks to its WAN
//! connection service using SSDP, device description XML and SOAP.
//!
//! # Module Structure
//!
//! - `ssdp` - M-SEARCH request/response over UDP
//! - `description` - Device description fetch and control URL resolution
//! - `soap` - Low-level SOAP protocol implementation
//! - `services` - WAN connection service definitions (URNs, preference)
//! - `traits` - Trait abstractions for testability
//! - `client` - `UpnpClient` concrete trait implementation
//! - `utils` - Shared XML helpers

pub mod client;
pub mod description;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use client::UpnpClient;
pub use description::{DescriptionError, DescriptionResult, ServiceEndpoint};
pub use services::WanService;
pub use soap::{SoapAction, SoapError, SoapResult};
pub use ssdp::{DeviceLocation, DiscoveryError, DiscoveryResult, MSearchRequest};
pub use traits::{DiscoveryTransport, GatewayClient, InvocationTransport};
