//! Low-level SOAP protocol implementation for UPnP control.
//!
//! This module handles SOAP envelope building, the HTTP POST to a control
//! URL, action response parsing and UPnP fault decoding. For the port
//! mapping operations built on top of it, see `mapping.rs`.

use std::time::{Duration, Instant};

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use reqwest::blocking::Client;
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use thiserror::Error;
use url::Url;

use super::utils::{decode_text, escape_xml, extract_xml_text};
use crate::protocol_constants::{
    SOAP_CONTENT_TYPE, SOAP_ENCODING_STYLE, SOAP_ENVELOPE_NAMESPACE, SOAP_TIMEOUT_SECS,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during SOAP operations with a gateway.
#[derive(Debug, Error)]
pub enum SoapError {
    /// HTTP-level failure: connection error, timeout, or an error status
    /// whose body carries no recognizable UPnP fault.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a UPnP fault.
    #[error("UPnP fault: {description}")]
    Fault {
        /// UPnP `errorCode` (e.g. 718), when the gateway sent one.
        code: Option<u16>,
        /// UPnP `errorDescription` text, verbatim.
        description: String,
        /// The transport failure the fault arrived with.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A success response body was not well-formed XML.
    #[error("failed to parse SOAP response: {0}")]
    Parse(String),
}

/// Convenient Result alias for SOAP operations.
pub type SoapResult<T> = Result<T, SoapError>;

impl SoapError {
    /// Returns the UPnP error code if this is a fault that carried one.
    #[must_use]
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            SoapError::Fault { code, .. } => *code,
            _ => None,
        }
    }
}

/// `errorCode`/`errorDescription` pair decoded from a UPnP fault body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    pub code: Option<u16>,
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Action
// ─────────────────────────────────────────────────────────────────────────────

/// A named action bound to a service type, with ordered arguments.
///
/// Argument order matters: gateways validate it against the service schema.
///
/// # Example
/// ```ignore
/// let service = "urn:schemas-upnp-org:service:WANIPConnection:1";
/// let action = SoapAction::new(service, "DeletePortMapping")
///     .arg("NewRemoteHost", "")
///     .arg("NewExternalPort", "8080")
///     .arg("NewProtocol", "TCP");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapAction {
    service_type: String,
    name: String,
    args: Vec<(String, String)>,
}

impl SoapAction {
    /// Creates an action with no arguments.
    #[must_use]
    pub fn new(service_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument. Arguments are sent in the order they are added.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    #[must_use]
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Value of the `SOAPACTION` header: `"<serviceType>#<action>"`, quoted.
    #[must_use]
    pub fn soap_action_header(&self) -> String {
        format!("\"{}#{}\"", self.service_type, self.name)
    }

    /// Builds the SOAP 1.1 request envelope.
    ///
    /// Single line with no whitespace before the root element; some gateway
    /// SOAP parsers reject anything else.
    #[must_use]
    pub fn to_envelope(&self) -> String {
        let mut body = format!(
            r#"<?xml version="1.0"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="{}" SOAP-ENV:encodingStyle="{}"><SOAP-ENV:Body><m:{} xmlns:m="{}">"#,
            SOAP_ENVELOPE_NAMESPACE,
            SOAP_ENCODING_STYLE,
            self.name,
            escape_xml(&self.service_type)
        );

        for (k, v) in &self.args {
            body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
        }

        body.push_str(&format!("</m:{}></SOAP-ENV:Body></SOAP-ENV:Envelope>", self.name));
        body
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the output arguments of `<action>Response` as (name, value) pairs.
///
/// The body must be a complete SOAP envelope. The response element must be
/// bound to the action's service type; its direct children are returned in
/// document order. An envelope without the response element yields no pairs.
pub fn parse_action_response(xml: &str, action: &SoapAction) -> SoapResult<Vec<(String, String)>> {
    let response_name = format!("{}Response", action.name());
    let mut reader = NsReader::from_str(xml);
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut root_seen = false;
    let mut inside = false;
    let mut found = false;
    let mut values = Vec::new();

    loop {
        let (ns, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| SoapError::Parse(e.to_string()))?;
        let in_service_ns = matches!(
            ns,
            ResolveResult::Bound(Namespace(uri)) if uri == action.service_type().as_bytes()
        );
        let in_envelope_ns = matches!(
            ns,
            ResolveResult::Bound(Namespace(uri)) if uri == SOAP_ENVELOPE_NAMESPACE.as_bytes()
        );

        match event {
            Event::Start(ref e) | Event::Empty(ref e) if depth == 0 => {
                if root_seen || !in_envelope_ns || e.local_name().as_ref() != b"Envelope" {
                    return Err(SoapError::Parse(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                root_seen = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::Start(e) if !inside => {
                if !found && in_service_ns && e.local_name().as_ref() == response_name.as_bytes() {
                    inside = true;
                    found = true;
                }
                depth += 1;
            }
            Event::Empty(e) if !inside => {
                if !found && in_service_ns && e.local_name().as_ref() == response_name.as_bytes() {
                    found = true;
                }
            }
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let text = reader
                    .read_text(e.name())
                    .map_err(|e| SoapError::Parse(e.to_string()))?;
                values.push((name, decode_text(&text)));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                values.push((name, String::new()));
            }
            Event::End(_) => {
                // Children are consumed whole by read_text, so an End while
                // inside closes the response element itself.
                inside = false;
                depth = depth.saturating_sub(1);
            }
            Event::Eof if !root_seen => {
                return Err(SoapError::Parse("no root element".to_string()));
            }
            Event::Eof if depth > 0 => {
                return Err(SoapError::Parse(format!(
                    "unexpected end of document with {} element(s) open",
                    depth
                )));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !found {
        log::warn!(
            "[SOAP] {} not found in {} response",
            response_name,
            action.name()
        );
    }
    Ok(values)
}

/// Decodes a UPnP fault body.
///
/// Returns None if the body is not XML or has no `errorDescription`.
pub fn parse_upnp_fault(xml: &str) -> Option<UpnpFault> {
    let description = extract_xml_text(xml, "errorDescription")?;
    let code = extract_xml_text(xml, "errorCode").and_then(|c| c.parse().ok());
    Some(UpnpFault { code, description })
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Sends a SOAP action to a control URL and returns its output arguments.
///
/// This is the core transport function for all UPnP control operations.
/// The request asks the gateway to close the connection afterwards.
///
/// # Errors
/// - [`SoapError::Fault`] when an HTTP error response carries an
///   `errorDescription`.
/// - [`SoapError::Http`] for any other transport or status failure.
/// - [`SoapError::Parse`] when a success body is not well-formed XML.
pub fn send_soap_request(
    client: &Client,
    control_url: &Url,
    action: &SoapAction,
) -> SoapResult<Vec<(String, String)>> {
    let body = action.to_envelope();

    log::info!(
        "[SOAP] {} -> {} (body: {} bytes)",
        action.name(),
        control_url,
        body.len()
    );
    log::debug!("[SOAP] Request body: {}", body);

    let start = Instant::now();
    let res = client
        .post(control_url.clone())
        .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
        .header("SOAPACTION", action.soap_action_header())
        .header(CONNECTION, "close")
        .body(body)
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .send();

    log::info!(
        "[SOAP] {} completed in {:?}: {:?}",
        action.name(),
        start.elapsed(),
        res.as_ref().map(|r| r.status())
    );

    let res = res?;
    let status_error = res.error_for_status_ref().err();
    let response_text = res.text();

    match status_error {
        Some(transport) => {
            let fault = response_text.ok().as_deref().and_then(parse_upnp_fault);
            match fault {
                Some(UpnpFault { code, description }) => {
                    log::warn!(
                        "[SOAP] {} fault {:?}: {}",
                        action.name(),
                        code,
                        description
                    );
                    Err(SoapError::Fault {
                        code,
                        description,
                        source: Box::new(transport),
                    })
                }
                None => Err(SoapError::Http(transport)),
            }
        }
        None => parse_action_response(&response_text?, action),
    }
}
