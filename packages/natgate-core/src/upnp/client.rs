//! Production gateway client over SSDP and HTTP.

use std::collections::HashMap;

use reqwest::blocking::Client;
use url::Url;

use super::description::{self, DescriptionResult, ServiceEndpoint};
use super::soap::{self, SoapAction, SoapResult};
use super::ssdp::{self, DeviceLocation, DiscoveryResult, MSearchRequest};
use super::traits::{DiscoveryTransport, InvocationTransport};

/// Gateway client that talks to real devices on the network.
///
/// Connections are not pooled: every request asks the gateway to close the
/// connection, and idle sockets are never kept around.
#[derive(Debug, Clone)]
pub struct UpnpClient {
    http: Client,
}

impl UpnpClient {
    /// Creates a client with a fresh HTTP connection setup.
    ///
    /// Gateways live on the local network, so system proxies are bypassed.
    ///
    /// # Errors
    /// Returns [`soap::SoapError::Http`] if the HTTP client cannot be built.
    pub fn new() -> SoapResult<Self> {
        let http = Client::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(Self { http })
    }

    /// Wraps an existing HTTP client.
    #[must_use]
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }
}

impl DiscoveryTransport for UpnpClient {
    fn discover(&self, request: &MSearchRequest) -> DiscoveryResult<DeviceLocation> {
        ssdp::discover(request)
    }

    fn resolve_control_urls(
        &self,
        location: &DeviceLocation,
        service_types: &[&str],
    ) -> DescriptionResult<HashMap<String, ServiceEndpoint>> {
        description::resolve_control_urls(&self.http, location, service_types)
    }
}

impl InvocationTransport for UpnpClient {
    fn invoke(&self, control_url: &Url, action: &SoapAction) -> SoapResult<Vec<(String, String)>> {
        soap::send_soap_request(&self.http, control_url, action)
    }
}
