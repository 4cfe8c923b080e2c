//! CLI configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use natgate_core::protocol_constants::DEFAULT_MAPPING_DESCRIPTION;
use natgate_core::{AddressFamily, MSearchRequest, MappingRequest, Protocol, ServiceEndpoint};
use serde::Deserialize;

/// CLI configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// M-SEARCH parameters (`endpoint`, `search_target`, `mx`).
    /// Overrides: `NATGATE_SEARCH_TARGET`, `NATGATE_MX`
    pub search: MSearchRequest,

    /// Host mappings forward to. Detected when not specified.
    /// Override: `NATGATE_INTERNAL_CLIENT`
    pub internal_client: Option<IpAddr>,

    /// Address family used for detection (`v4` or `v6`).
    pub address_family: AddressFamily,

    /// Description stored with each mapping on the gateway.
    /// Override: `NATGATE_DESCRIPTION`
    pub description: String,

    /// Known WAN service (`service_type`, `control_url`). Skips discovery.
    pub endpoint: Option<ServiceEndpoint>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            search: MSearchRequest::default(),
            internal_client: None,
            address_family: AddressFamily::default(),
            description: DEFAULT_MAPPING_DESCRIPTION.to_string(),
            endpoint: None,
        }
    }
}

impl CliConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `NATGATE_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(target) = lookup("NATGATE_SEARCH_TARGET") {
            self.search.search_target = target;
        }

        if let Some(mx) = lookup("NATGATE_MX").and_then(|v| v.parse().ok()) {
            self.search.mx = mx;
        }

        if let Some(ip) = lookup("NATGATE_INTERNAL_CLIENT").and_then(|v| v.parse().ok()) {
            self.internal_client = Some(ip);
        }

        if let Some(description) = lookup("NATGATE_DESCRIPTION") {
            self.description = description;
        }
    }

    /// Builds the request for one mapping.
    pub fn to_request(
        &self,
        protocol: Protocol,
        internal_port: u16,
        external_port: Option<u16>,
    ) -> MappingRequest {
        let mut request = MappingRequest::new(protocol, internal_port)
            .address_family(self.address_family)
            .description(self.description.clone())
            .search(self.search.clone());
        request.external_port = external_port;
        request.internal_client = self.internal_client;
        request.endpoint = self.endpoint.clone();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.description, "natgate");
        assert_eq!(config.search, MSearchRequest::default());
        assert!(config.internal_client.is_none());
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn load_reads_yaml_with_partial_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("natgate.yaml");
        std::fs::write(
            &path,
            "search:\n  mx: 1\n  search_target: urn:schemas-upnp-org:device:InternetGatewayDevice:1\n\
             internal_client: 10.0.0.7\n\
             endpoint:\n  service_type: urn:schemas-upnp-org:service:WANIPConnection:1\n  control_url: http://192.168.1.1:5000/ctl/IPConn\n",
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.search.mx, 1);
        assert_eq!(
            config.search.search_target,
            "urn:schemas-upnp-org:device:InternetGatewayDevice:1"
        );
        assert_eq!(
            config.search.endpoint,
            MSearchRequest::default().endpoint
        );
        assert_eq!(
            config.internal_client,
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
        );
        let endpoint = config.endpoint.unwrap();
        assert_eq!(endpoint.control_url.path(), "/ctl/IPConn");
    }

    #[test]
    fn load_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = CliConfig::load(Some(&temp_dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = CliConfig::default();
        config.apply_overrides(lookup(&[
            ("NATGATE_SEARCH_TARGET", "ssdp:all"),
            ("NATGATE_MX", "5"),
            ("NATGATE_INTERNAL_CLIENT", "192.168.1.20"),
            ("NATGATE_DESCRIPTION", "nightly build"),
        ]));

        assert_eq!(config.search.search_target, "ssdp:all");
        assert_eq!(config.search.mx, 5);
        assert_eq!(
            config.internal_client,
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        );
        assert_eq!(config.description, "nightly build");
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut config = CliConfig::default();
        config.apply_overrides(lookup(&[
            ("NATGATE_MX", "soon"),
            ("NATGATE_INTERNAL_CLIENT", "router"),
        ]));
        assert_eq!(config.search.mx, MSearchRequest::default().mx);
        assert!(config.internal_client.is_none());
    }

    #[test]
    fn to_request_carries_config() {
        let mut config = CliConfig::default();
        config.description = "ssh".to_string();
        config.internal_client = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        let request = config.to_request(Protocol::Tcp, 22, Some(2222));
        assert_eq!(request.protocol, Protocol::Tcp);
        assert_eq!(request.internal_port, 22);
        assert_eq!(request.effective_external_port(), 2222);
        assert_eq!(request.description, "ssh");
        assert_eq!(request.internal_client, config.internal_client);
    }
}
