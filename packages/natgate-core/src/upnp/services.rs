//! IGD WAN connection service definitions.
//!
//! Single source of truth for the service type URNs the port mapper
//! resolves and the order in which it prefers them.

use serde::Serialize;

/// WAN connection services that expose the port mapping actions.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WanService {
    /// PPP connection (DSL/PPPoE gateways).
    PppConnection,
    /// IP connection (cable, fibre, most consumer routers).
    IpConnection,
}

impl WanService {
    /// All supported services, most preferred first.
    pub const PREFERENCE_ORDER: [WanService; 2] = [Self::PppConnection, Self::IpConnection];

    /// Returns the UPnP service type URN used for resolution and SOAP requests.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            Self::PppConnection => "urn:schemas-upnp-org:service:WANPPPConnection:1",
            Self::IpConnection => "urn:schemas-upnp-org:service:WANIPConnection:1",
        }
    }

    /// Returns a human-readable name for this service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PppConnection => "WANPPPConnection",
            Self::IpConnection => "WANIPConnection",
        }
    }

    /// Service type URNs of every supported service, most preferred first.
    #[must_use]
    pub fn all_urns() -> Vec<&'static str> {
        Self::PREFERENCE_ORDER.iter().map(WanService::urn).collect()
    }
}
