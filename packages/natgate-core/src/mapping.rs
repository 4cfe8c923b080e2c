//! Port mapping sessions.
//!
//! [`PortMapper`] runs the discovery → description → `AddPortMapping`
//! pipeline and hands back a [`PortMapping`]. The mapping owns the gateway
//! entry it created: it can query the external address while active, and it
//! removes the entry exactly once, either through [`PortMapping::delete`] or
//! when dropped.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::{AddressFamily, IpDetector, LocalIpDetector};
use crate::error::{MappingError, MappingResult};
use crate::protocol_constants::{DEFAULT_MAPPING_DESCRIPTION, PERMANENT_LEASE_DURATION};
use crate::upnp::{
    GatewayClient, MSearchRequest, ServiceEndpoint, SoapAction, UpnpClient, WanService,
};

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Transport protocol of a port mapping.
///
/// Serialized as `TCP`/`UDP`; any letter case is accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Returns the value sent as `NewProtocol`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a protocol name is neither TCP nor UDP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol '{0}' (expected TCP or UDP)")]
pub struct ParseProtocolError(String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(ParseProtocolError(s.to_string()))
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = ParseProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Protocol> for &'static str {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str()
    }
}

fn default_description() -> String {
    DEFAULT_MAPPING_DESCRIPTION.to_string()
}

/// Everything needed to create one port mapping.
///
/// Only `protocol` and `internal_port` are required; the rest fall back to
/// sensible defaults when omitted from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRequest {
    pub protocol: Protocol,
    pub internal_port: u16,
    /// Port opened on the WAN side. Defaults to `internal_port`.
    #[serde(default)]
    pub external_port: Option<u16>,
    /// Host the gateway forwards to. Defaults to this machine's address.
    #[serde(default)]
    pub internal_client: Option<IpAddr>,
    /// Family used when detecting the default internal client.
    #[serde(default)]
    pub address_family: AddressFamily,
    #[serde(default = "default_description")]
    pub description: String,
    /// Known WAN service endpoint. Skips discovery when set.
    #[serde(default)]
    pub endpoint: Option<ServiceEndpoint>,
    #[serde(default)]
    pub search: MSearchRequest,
}

impl MappingRequest {
    /// Creates a request mapping `internal_port` to the same external port.
    #[must_use]
    pub fn new(protocol: Protocol, internal_port: u16) -> Self {
        Self {
            protocol,
            internal_port,
            external_port: None,
            internal_client: None,
            address_family: AddressFamily::default(),
            description: default_description(),
            endpoint: None,
            search: MSearchRequest::default(),
        }
    }

    #[must_use]
    pub fn external_port(mut self, port: u16) -> Self {
        self.external_port = Some(port);
        self
    }

    #[must_use]
    pub fn internal_client(mut self, client: IpAddr) -> Self {
        self.internal_client = Some(client);
        self
    }

    #[must_use]
    pub fn address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn search(mut self, search: MSearchRequest) -> Self {
        self.search = search;
        self
    }

    /// External port that will be requested from the gateway.
    #[must_use]
    pub fn effective_external_port(&self) -> u16 {
        self.external_port.unwrap_or(self.internal_port)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Port Mapper
// ─────────────────────────────────────────────────────────────────────────────

/// Creates port mappings through a gateway client.
pub struct PortMapper {
    gateway: Arc<dyn GatewayClient>,
    ip_detector: Arc<dyn IpDetector>,
}

impl PortMapper {
    /// Creates a mapper over the given gateway client.
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        Self {
            gateway,
            ip_detector: LocalIpDetector::arc(),
        }
    }

    /// Creates a mapper that talks to real gateways over the network.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn native() -> MappingResult<Self> {
        Ok(Self::new(Arc::new(UpnpClient::new()?)))
    }

    /// Replaces the detector used for the default internal client.
    #[must_use]
    pub fn with_ip_detector(mut self, ip_detector: Arc<dyn IpDetector>) -> Self {
        self.ip_detector = ip_detector;
        self
    }

    /// Discovers a gateway and picks its WAN connection service.
    ///
    /// `WANPPPConnection` is preferred over `WANIPConnection` when a device
    /// offers both.
    pub fn locate_service(&self, search: &MSearchRequest) -> MappingResult<ServiceEndpoint> {
        let location = self.gateway.discover(search)?;
        let mut endpoints = self
            .gateway
            .resolve_control_urls(&location, &WanService::all_urns())?;

        WanService::PREFERENCE_ORDER
            .iter()
            .find_map(|service| endpoints.remove(service.urn()))
            .ok_or_else(|| MappingError::NoWanService {
                location: location.to_string(),
            })
    }

    /// Adds a port mapping on the gateway.
    ///
    /// Any failure along the way is returned as is and leaves nothing
    /// mapped on the gateway side that this crate knows about.
    pub fn create(&self, request: &MappingRequest) -> MappingResult<PortMapping> {
        let internal_client = match request.internal_client {
            Some(client) => client,
            None => self.ip_detector.detect(request.address_family)?,
        };

        let endpoint = match &request.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => self.locate_service(&request.search)?,
        };

        PortMapping::add(
            Arc::clone(&self.gateway),
            endpoint,
            request,
            internal_client,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Port Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`PortMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MappingState {
    Active,
    Deleted,
}

/// A port mapping created on a gateway.
///
/// Dropping an active mapping deletes it on the gateway; failures during
/// that implicit delete are logged and ignored.
pub struct PortMapping {
    protocol: Protocol,
    internal_port: u16,
    external_port: u16,
    internal_client: IpAddr,
    description: String,
    endpoint: ServiceEndpoint,
    gateway: Arc<dyn GatewayClient>,
    state: Mutex<MappingState>,
}

impl PortMapping {
    fn add(
        gateway: Arc<dyn GatewayClient>,
        endpoint: ServiceEndpoint,
        request: &MappingRequest,
        internal_client: IpAddr,
    ) -> MappingResult<Self> {
        let external_port = request.effective_external_port();

        let action = SoapAction::new(&endpoint.service_type, "AddPortMapping")
            .arg("NewRemoteHost", "")
            .arg("NewExternalPort", external_port.to_string())
            .arg("NewProtocol", request.protocol.as_str())
            .arg("NewInternalPort", request.internal_port.to_string())
            .arg("NewInternalClient", internal_client.to_string())
            .arg("NewEnabled", "1")
            .arg("NewPortMappingDescription", request.description.as_str())
            .arg("NewLeaseDuration", PERMANENT_LEASE_DURATION.to_string());

        gateway.invoke(&endpoint.control_url, &action)?;

        let mapping = Self {
            protocol: request.protocol,
            internal_port: request.internal_port,
            external_port,
            internal_client,
            description: request.description.clone(),
            endpoint,
            gateway,
            state: Mutex::new(MappingState::Active),
        };
        log::info!("[Mapping] Added {}", mapping);
        Ok(mapping)
    }

    fn ensure_active(&self) -> MappingResult<()> {
        match *self.state.lock() {
            MappingState::Active => Ok(()),
            MappingState::Deleted => Err(MappingError::Disposed),
        }
    }

    /// Asks the gateway for its external (WAN) address.
    ///
    /// # Errors
    /// [`MappingError::Disposed`] once the mapping has been deleted.
    pub fn external_ip_address(&self) -> MappingResult<IpAddr> {
        const FIELD: &str = "NewExternalIPAddress";

        self.ensure_active()?;

        let action = SoapAction::new(&self.endpoint.service_type, "GetExternalIPAddress");
        let values = self.gateway.invoke(&self.endpoint.control_url, &action)?;

        let raw = values
            .into_iter()
            .find(|(name, _)| name == FIELD)
            .map(|(_, value)| value)
            .ok_or(MappingError::MissingField(FIELD))?;

        raw.trim()
            .parse()
            .map_err(|_| MappingError::InvalidResponse {
                field: FIELD,
                value: raw.clone(),
            })
    }

    /// Removes the mapping from the gateway.
    ///
    /// The mapping is marked deleted before the request goes out, so the
    /// gateway sees at most one `DeletePortMapping` per mapping. Calling this
    /// again is a no-op.
    pub fn delete(&self) -> MappingResult<()> {
        {
            let mut state = self.state.lock();
            if *state == MappingState::Deleted {
                return Ok(());
            }
            *state = MappingState::Deleted;
        }

        let action = SoapAction::new(&self.endpoint.service_type, "DeletePortMapping")
            .arg("NewRemoteHost", "")
            .arg("NewExternalPort", self.external_port.to_string())
            .arg("NewProtocol", self.protocol.as_str());

        match self.gateway.invoke(&self.endpoint.control_url, &action) {
            Ok(_) => {
                log::info!("[Mapping] Deleted {}", self);
                Ok(())
            }
            Err(e) => {
                log::warn!("[Mapping] Failed to delete {}: {}", self, e);
                Err(e.into())
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> MappingState {
        *self.state.lock()
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn internal_port(&self) -> u16 {
        self.internal_port
    }

    #[must_use]
    pub fn external_port(&self) -> u16 {
        self.external_port
    }

    #[must_use]
    pub fn internal_client(&self) -> IpAddr {
        self.internal_client
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// WAN service the mapping was created on.
    #[must_use]
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client = std::net::SocketAddr::new(self.internal_client, self.internal_port);
        write!(f, "{} {} -> {}", self.protocol, self.external_port, client)
    }
}

impl fmt::Debug for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortMapping")
            .field("protocol", &self.protocol)
            .field("internal_port", &self.internal_port)
            .field("external_port", &self.external_port)
            .field("internal_client", &self.internal_client)
            .field("description", &self.description)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for PortMapping {
    fn drop(&mut self) {
        if self.state() == MappingState::Deleted {
            return;
        }
        log::debug!("[Mapping] Removing {} on drop", self);
        if let Err(e) = self.delete() {
            log::debug!("[Mapping] Ignoring cleanup failure: {}", e);
        }
    }
}
