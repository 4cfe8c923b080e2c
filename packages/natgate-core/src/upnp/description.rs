//! Device description retrieval and control URL resolution.
//!
//! Fetches the XML description found at an SSDP location, walks every
//! `device` element (embedded devices included) and resolves the control
//! URL of each requested service type.

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use reqwest::blocking::Client;
use reqwest::header::CONNECTION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::ssdp::DeviceLocation;
use super::utils::decode_text;
use crate::protocol_constants::{DESCRIPTION_TIMEOUT_SECS, DEVICE_NAMESPACE};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while fetching or reading a device description.
#[derive(Debug, Error)]
pub enum DescriptionError {
    /// HTTP request for the description failed or returned an error status.
    #[error("failed to fetch device description: {0}")]
    Http(#[from] reqwest::Error),

    /// The description body is not well-formed XML.
    #[error("failed to parse device description: {0}")]
    Parse(String),

    /// A matched service's control URL could not be made absolute.
    #[error("invalid control URL '{raw}' (location {location})")]
    InvalidControlUrl {
        /// Raw `controlURL` text.
        raw: String,
        /// Location the description was fetched from.
        location: String,
    },
}

/// Convenient Result alias for description operations.
pub type DescriptionResult<T> = Result<T, DescriptionError>;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A service type paired with its absolute control URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service type URN (e.g. `urn:schemas-upnp-org:service:WANIPConnection:1`).
    pub service_type: String,
    /// Absolute URL SOAP actions are POSTed to.
    pub control_url: Url,
}

impl ServiceEndpoint {
    /// Creates an endpoint from a service type and an absolute control URL.
    pub fn new(service_type: impl Into<String>, control_url: Url) -> Self {
        Self {
            service_type: service_type.into(),
            control_url,
        }
    }
}

/// A `service` entry as written in the description, before URL resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawService {
    pub service_type: String,
    pub control_url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Makes a raw `controlURL` absolute.
///
/// A value that parses as an absolute URL is used as is. Anything else is
/// appended to `scheme://host:port` of the location. The base path of the
/// location is deliberately ignored.
pub fn resolve_control_url(location: &DeviceLocation, raw: &str) -> DescriptionResult<Url> {
    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }

    let invalid = || DescriptionError::InvalidControlUrl {
        raw: raw.to_string(),
        location: location.to_string(),
    };

    let host = location.host_str().ok_or_else(invalid)?;
    let port = location.port_or_known_default().ok_or_else(invalid)?;
    let separator = if raw.starts_with('/') { "" } else { "/" };

    Url::parse(&format!(
        "{}://{}:{}{}{}",
        location.scheme(),
        host,
        port,
        separator,
        raw
    ))
    .map_err(|_| invalid())
}

/// Returns true if the stack of open elements ends with `suffix` (innermost last).
fn stack_ends_with(stack: &[Option<Vec<u8>>], suffix: &[&[u8]]) -> bool {
    stack.len() >= suffix.len()
        && stack[stack.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(open, want)| open.as_deref() == Some(*want))
}

/// Lists every `device/serviceList/service` entry in document order.
///
/// Only elements in the UPnP device namespace count; embedded devices under
/// `deviceList` are walked like the root device. Services missing either
/// `serviceType` or `controlURL` are skipped.
pub fn parse_service_list(xml: &str) -> DescriptionResult<Vec<RawService>> {
    let mut reader = NsReader::from_str(xml);
    let mut buf = Vec::new();

    // Local names of open elements; None for elements outside the device namespace.
    let mut stack: Vec<Option<Vec<u8>>> = Vec::new();
    let mut current: Option<RawService> = None;
    let mut services = Vec::new();
    let mut root_seen = false;

    loop {
        let (ns, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| DescriptionError::Parse(e.to_string()))?;
        let in_device_ns = matches!(
            ns,
            ResolveResult::Bound(Namespace(uri)) if uri == DEVICE_NAMESPACE.as_bytes()
        );

        match event {
            Event::Start(ref e) | Event::Empty(ref e) if stack.is_empty() => {
                if root_seen || !in_device_ns || e.local_name().as_ref() != b"root" {
                    return Err(DescriptionError::Parse(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                root_seen = true;
                if matches!(event, Event::Start(_)) {
                    stack.push(Some(b"root".to_vec()));
                }
            }
            Event::Start(e) => {
                let local = in_device_ns.then(|| e.local_name().as_ref().to_vec());

                match local.as_deref() {
                    Some(b"service") if stack_ends_with(&stack, &[b"device", b"serviceList"]) => {
                        current = Some(RawService::default());
                    }
                    Some(field @ (b"serviceType" | b"controlURL"))
                        if current.is_some() && stack_ends_with(&stack, &[b"service"]) =>
                    {
                        // read_text consumes the matching End event, so the
                        // element is never pushed onto the stack.
                        let text = reader
                            .read_text(e.name())
                            .map_err(|e| DescriptionError::Parse(e.to_string()))?;
                        if let Some(service) = current.as_mut() {
                            if field == b"serviceType" {
                                service.service_type = decode_text(&text);
                            } else {
                                service.control_url = decode_text(&text);
                            }
                        }
                        buf.clear();
                        continue;
                    }
                    _ => {}
                }
                stack.push(local);
            }
            Event::End(_) => {
                if let Some(Some(local)) = stack.pop() {
                    if local == b"service"
                        && stack_ends_with(&stack, &[b"device", b"serviceList"])
                    {
                        if let Some(service) = current.take() {
                            if service.service_type.is_empty() || service.control_url.is_empty() {
                                log::debug!(
                                    "[Description] Skipping incomplete service entry: {:?}",
                                    service
                                );
                            } else {
                                services.push(service);
                            }
                        }
                    }
                }
            }
            Event::Eof if !root_seen => {
                return Err(DescriptionError::Parse("no root element".to_string()));
            }
            Event::Eof if !stack.is_empty() => {
                return Err(DescriptionError::Parse(format!(
                    "unexpected end of document with {} element(s) open",
                    stack.len()
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(services)
}

/// Resolves control URLs for the requested service types from a description body.
///
/// Only exact `serviceType` matches are returned; the first occurrence of a
/// type wins. Service types that do not appear are absent from the map.
pub fn resolve_from_xml(
    xml: &str,
    location: &DeviceLocation,
    service_types: &[&str],
) -> DescriptionResult<HashMap<String, ServiceEndpoint>> {
    let mut endpoints = HashMap::new();

    for service in parse_service_list(xml)? {
        if !service_types.contains(&service.service_type.as_str())
            || endpoints.contains_key(&service.service_type)
        {
            continue;
        }

        let control_url = resolve_control_url(location, &service.control_url)?;
        log::debug!(
            "[Description] {} -> {}",
            service.service_type,
            control_url
        );
        endpoints.insert(
            service.service_type.clone(),
            ServiceEndpoint::new(service.service_type, control_url),
        );
    }

    Ok(endpoints)
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetching
// ─────────────────────────────────────────────────────────────────────────────

/// Downloads the device description document.
pub fn fetch_description(client: &Client, location: &DeviceLocation) -> DescriptionResult<String> {
    log::debug!("[Description] GET {}", location);

    let res = client
        .get(location.clone())
        .header(CONNECTION, "close")
        .timeout(Duration::from_secs(DESCRIPTION_TIMEOUT_SECS))
        .send()?
        .error_for_status()?;

    Ok(res.text()?)
}

/// Fetches the description at `location` and resolves the requested service types.
pub fn resolve_control_urls(
    client: &Client,
    location: &DeviceLocation,
    service_types: &[&str],
) -> DescriptionResult<HashMap<String, ServiceEndpoint>> {
    let xml = fetch_description(client, location)?;
    let endpoints = resolve_from_xml(&xml, location, service_types)?;

    log::info!(
        "[Description] {} of {} requested service(s) found at {}",
        endpoints.len(),
        service_types.len(),
        location
    );
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upnp::test_fixtures::{
        EMBEDDED_WAN_DESCRIPTION, FLAT_DESCRIPTION, WAN_IP_URN, WAN_PPP_URN,
    };

    fn location() -> Url {
        Url::parse("http://192.0.2.1:80/desc.xml").unwrap()
    }

    #[test]
    fn relative_control_url_uses_location_origin() {
        let url = resolve_control_url(&location(), "/ctl/IPConn").unwrap();
        assert_eq!(url, Url::parse("http://192.0.2.1:80/ctl/IPConn").unwrap());
        assert_eq!(url.port_or_known_default(), Some(80));
    }

    #[test]
    fn relative_control_url_ignores_location_path() {
        let location = Url::parse("http://10.0.0.1:5000/rootDesc/igd.xml").unwrap();
        let url = resolve_control_url(&location, "/ctl/IPConn").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:5000/ctl/IPConn");
    }

    #[test]
    fn relative_control_url_without_leading_slash() {
        let location = Url::parse("http://10.0.0.1:5000/rootDesc.xml").unwrap();
        let url = resolve_control_url(&location, "upnp/control/WANIPConn1").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:5000/upnp/control/WANIPConn1");
    }

    #[test]
    fn absolute_control_url_is_kept() {
        let url =
            resolve_control_url(&location(), "http://192.0.2.9:49000/igdupnp/control/WANIPConn1")
                .unwrap();
        assert_eq!(url.as_str(), "http://192.0.2.9:49000/igdupnp/control/WANIPConn1");
    }

    #[test]
    fn parse_service_list_walks_embedded_devices() {
        let services = parse_service_list(EMBEDDED_WAN_DESCRIPTION).unwrap();
        let types: Vec<_> = services.iter().map(|s| s.service_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "urn:schemas-upnp-org:service:Layer3Forwarding:1",
                "urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1",
                WAN_IP_URN,
            ]
        );
        assert_eq!(services[2].control_url, "/ctl/IPConn");
    }

    #[test]
    fn resolve_from_xml_only_returns_requested_types() {
        let endpoints = resolve_from_xml(
            EMBEDDED_WAN_DESCRIPTION,
            &location(),
            &[WAN_PPP_URN, WAN_IP_URN],
        )
        .unwrap();

        assert_eq!(endpoints.len(), 1);
        assert!(!endpoints.contains_key(WAN_PPP_URN));
        let ip = &endpoints[WAN_IP_URN];
        assert_eq!(ip.service_type, WAN_IP_URN);
        assert_eq!(ip.control_url, Url::parse("http://192.0.2.1:80/ctl/IPConn").unwrap());
    }

    #[test]
    fn resolve_from_xml_first_duplicate_wins() {
        let endpoints = resolve_from_xml(FLAT_DESCRIPTION, &location(), &[WAN_IP_URN]).unwrap();
        assert_eq!(
            endpoints[WAN_IP_URN].control_url.as_str(),
            "http://192.0.2.1/first/control"
        );
    }

    #[test]
    fn resolve_from_xml_missing_type_is_absent_not_error() {
        let endpoints = resolve_from_xml(
            FLAT_DESCRIPTION,
            &location(),
            &["urn:schemas-upnp-org:service:WANIPConnection:2"],
        )
        .unwrap();
        assert!(endpoints.is_empty());
    }

    #[test]
    fn elements_outside_device_namespace_are_ignored() {
        let xml = format!(
            r#"<root xmlns="urn:schemas-upnp-org:device-1-0" xmlns:x="urn:example:other">
  <device>
    <x:serviceList>
      <x:service>
        <x:serviceType>{WAN_IP_URN}</x:serviceType>
        <x:controlURL>/foreign</x:controlURL>
      </x:service>
    </x:serviceList>
  </device>
</root>"#
        );
        assert!(parse_service_list(&xml).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0"><device></root>"#;
        assert!(matches!(
            parse_service_list(xml),
            Err(DescriptionError::Parse(_))
        ));
    }

    #[test]
    fn body_without_root_element_is_parse_error() {
        for body in ["", "   \n", "Service Unavailable"] {
            assert!(
                matches!(parse_service_list(body), Err(DescriptionError::Parse(_))),
                "body {:?} should not parse",
                body
            );
        }
    }

    #[test]
    fn truncated_description_is_parse_error() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0"><device><serviceList>"#;
        assert!(matches!(
            parse_service_list(xml),
            Err(DescriptionError::Parse(_))
        ));
    }

    #[test]
    fn html_error_page_is_parse_error() {
        let xml = "<html><body>busy</body></html>";
        assert!(matches!(
            parse_service_list(xml),
            Err(DescriptionError::Parse(_))
        ));
        assert!(matches!(
            resolve_from_xml(xml, &location(), &[WAN_IP_URN]),
            Err(DescriptionError::Parse(_))
        ));
    }

    #[test]
    fn empty_device_description_has_no_services() {
        let xml = r#"<?xml version="1.0"?><root xmlns="urn:schemas-upnp-org:device-1-0"/>"#;
        assert!(parse_service_list(xml).unwrap().is_empty());
    }
}
