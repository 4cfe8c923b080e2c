//! Centralized error types for the natgate core library.
//!
//! Each protocol stage owns its error enum (see `upnp::ssdp`,
//! `upnp::description`, `upnp::soap`). [`MappingError`] wraps them for the
//! session API, and [`ErrorCode`] gives every variant a stable code.

use thiserror::Error;

use crate::context::NetworkError;
use crate::upnp::description::DescriptionError;
use crate::upnp::soap::SoapError;
use crate::upnp::ssdp::DiscoveryError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::JoinMulticast(_, _) => "multicast_join_failed",
            Self::SendSearch(_) => "ssdp_send_failed",
            Self::Receive(_) => "ssdp_receive_failed",
            Self::Timeout { .. } => "ssdp_timeout",
            Self::MissingLocation => "ssdp_missing_location",
            Self::InvalidLocation { .. } => "ssdp_invalid_location",
        }
    }
}

impl ErrorCode for DescriptionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Parse(_) => "description_parse_error",
            Self::InvalidControlUrl { .. } => "invalid_control_url",
        }
    }
}

impl ErrorCode for SoapError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Fault { .. } => "soap_fault",
            Self::Parse(_) => "soap_parse_error",
        }
    }
}

impl ErrorCode for NetworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Detection(_) => "local_ip_detection_failed",
            Self::FamilyMismatch { .. } => "address_family_mismatch",
        }
    }
}

/// Errors surfaced by the port mapping API.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Gateway discovery failed.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Device description could not be fetched or read.
    #[error("Device description failed: {0}")]
    Description(#[from] DescriptionError),

    /// A SOAP action failed (transport error or UPnP fault).
    #[error("SOAP request failed: {0}")]
    Soap(#[from] SoapError),

    /// The gateway offers neither WAN connection service.
    #[error("No WAN connection service found at {location}")]
    NoWanService {
        /// Description URL that was searched.
        location: String,
    },

    /// The mapping has already been deleted.
    #[error("Port mapping has already been deleted")]
    Disposed,

    /// A response lacked an expected output argument.
    #[error("Gateway response is missing {0}")]
    MissingField(&'static str),

    /// A response argument had an unusable value.
    #[error("Invalid {field} in gateway response: '{value}'")]
    InvalidResponse {
        field: &'static str,
        value: String,
    },

    /// Local address detection failed.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Convenient Result alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

impl MappingError {
    /// Returns the UPnP fault code, if a SOAP fault caused this error.
    #[must_use]
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            Self::Soap(e) => e.fault_code(),
            _ => None,
        }
    }
}

impl ErrorCode for MappingError {
    fn code(&self) -> &'static str {
        match self {
            Self::Discovery(e) => e.code(),
            Self::Description(e) => e.code(),
            Self::Soap(e) => e.code(),
            Self::NoWanService { .. } => "no_wan_service",
            Self::Disposed => "mapping_disposed",
            Self::MissingField(_) => "missing_field",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Network(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_error_delegates_codes() {
        let err: MappingError = DiscoveryError::Timeout { waited_ms: 4000 }.into();
        assert_eq!(err.code(), "ssdp_timeout");

        let err: MappingError = SoapError::Parse("bad".into()).into();
        assert_eq!(err.code(), "soap_parse_error");

        assert_eq!(MappingError::Disposed.code(), "mapping_disposed");
    }

    #[test]
    fn fault_code_passes_through() {
        let err: MappingError = SoapError::Fault {
            code: Some(718),
            description: "ConflictInMappingEntry".into(),
            source: "HTTP status 500".into(),
        }
        .into();
        assert_eq!(err.fault_code(), Some(718));
        assert_eq!(err.code(), "soap_fault");
        assert_eq!(MappingError::Disposed.fault_code(), None);
    }
}
