//! Local address detection.
//!
//! A port mapping forwards to an internal client. When the caller does not
//! name one, the machine's own address is used; [`IpDetector`] lets that
//! lookup be swapped out in tests or on hosts with unusual routing.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Address family of the internal client to detect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

/// Trait for detecting the local IP address.
///
/// Different environments may need different detection strategies.
/// This trait allows injecting the appropriate detector.
pub trait IpDetector: Send + Sync {
    /// Detects the local address of the given family.
    fn detect(&self, family: AddressFamily) -> Result<IpAddr, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    /// Creates a new `LocalIpDetector`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self::new())
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self, family: AddressFamily) -> Result<IpAddr, NetworkError> {
        let detected = match family {
            AddressFamily::V4 => local_ip_address::local_ip(),
            AddressFamily::V6 => local_ip_address::local_ipv6(),
        };
        detected.map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Fixed address, for hosts where the internal client is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIpDetector(pub IpAddr);

impl IpDetector for StaticIpDetector {
    fn detect(&self, family: AddressFamily) -> Result<IpAddr, NetworkError> {
        match (family, self.0) {
            (AddressFamily::V4, IpAddr::V4(_)) | (AddressFamily::V6, IpAddr::V6(_)) => Ok(self.0),
            _ => Err(NetworkError::FamilyMismatch {
                address: self.0,
                family,
            }),
        }
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// A configured address does not belong to the requested family.
    #[error("Address {address} does not match requested family {family:?}")]
    FamilyMismatch {
        address: IpAddr,
        family: AddressFamily,
    },
}
