//! Trait abstractions for gateway communication.
//!
//! These traits decouple the mapping session from the concrete SSDP/HTTP
//! implementation, enabling:
//! - Unit testing with mock gateways
//! - Alternative transports (e.g. an OS-provided UPnP stack)
//!
//! [`UpnpClient`](super::client::UpnpClient) is the production implementation.

use std::collections::HashMap;

use url::Url;

use super::description::{DescriptionResult, ServiceEndpoint};
use super::soap::{SoapAction, SoapResult};
use super::ssdp::{DeviceLocation, DiscoveryResult, MSearchRequest};

/// Locating a gateway and its services.
pub trait DiscoveryTransport: Send + Sync {
    /// Sends one M-SEARCH and returns the LOCATION of the first responder.
    fn discover(&self, request: &MSearchRequest) -> DiscoveryResult<DeviceLocation>;

    /// Resolves absolute control URLs for the requested service types.
    ///
    /// Service types the device does not offer are absent from the map.
    fn resolve_control_urls(
        &self,
        location: &DeviceLocation,
        service_types: &[&str],
    ) -> DescriptionResult<HashMap<String, ServiceEndpoint>>;
}

/// Invoking SOAP actions on a control URL.
pub trait InvocationTransport: Send + Sync {
    /// Invokes `action` and returns its output arguments in document order.
    fn invoke(&self, control_url: &Url, action: &SoapAction) -> SoapResult<Vec<(String, String)>>;
}

/// Combined trait for a full gateway client.
///
/// Automatically implemented for any type implementing both component traits.
pub trait GatewayClient: DiscoveryTransport + InvocationTransport {}

impl<T: DiscoveryTransport + InvocationTransport> GatewayClient for T {}
