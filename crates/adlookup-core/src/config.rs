//! Cloud Foundry service-binding configuration.
//!
//! Applications running on Cloud Foundry receive their bound services through the
//! `VCAP_SERVICES` environment variable: a JSON object keyed by service label, each value an
//! array of bindings. The connectivity binding carries the OAuth client used to obtain tunnel
//! tokens and the address of the on-premise SOCKS5 proxy.

use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use url::Url;
use validator::Validate;

/// Environment variable holding the service bindings.
pub const VCAP_SERVICES_ENV: &str = "VCAP_SERVICES";

/// Label/tag of the connectivity service binding.
pub const CONNECTIVITY_SERVICE: &str = "connectivity";

/// Path appended to the token service URL for the client-credentials grant.
const TOKEN_PATH: &str = "oauth/token";

/// All service bindings visible to the application.
#[derive(Debug, Clone, Default)]
pub struct ServiceBindings {
    bindings: Vec<ServiceBinding>,
}

impl ServiceBindings {
    /// Parses the JSON content of `VCAP_SERVICES`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is not valid JSON, has the wrong shape, or
    /// a binding fails validation.
    pub fn from_vcap_services(raw: &str) -> Result<Self, Error> {
        let by_label: HashMap<String, Vec<ServiceBinding>> = serde_json::from_str(raw)?;

        let mut bindings = Vec::new();
        for (label, entries) in by_label {
            for mut binding in entries {
                if binding.label.is_none() {
                    binding.label = Some(label.clone());
                }
                binding.credentials.validate().map_err(|e| {
                    Error::ConfigError(format!(
                        "Invalid credentials for service binding `{}`: {}",
                        binding.name, e
                    ))
                })?;
                bindings.push(binding);
            }
        }

        // HashMap iteration order is unspecified; keep lookups deterministic.
        bindings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { bindings })
    }

    /// Reads and parses `VCAP_SERVICES` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the variable is missing or cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        let raw = std::env::var(VCAP_SERVICES_ENV)
            .map_err(|e| Error::ConfigError(format!("{VCAP_SERVICES_ENV} unavailable: {e}")))?;
        Self::from_vcap_services(&raw)
    }

    /// Finds the first binding carrying `tag`, falling back to a binding whose label matches.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<&ServiceBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.tags.iter().any(|t| t == tag))
            .or_else(|| {
                self.bindings
                    .iter()
                    .find(|binding| binding.label.as_deref() == Some(tag))
            })
    }

    /// Returns the credentials of the binding identified by `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if no such binding exists.
    pub fn credentials(&self, tag: &str) -> Result<&ServiceCredentials, Error> {
        self.find(tag)
            .map(|binding| &binding.credentials)
            .ok_or_else(|| Error::ConfigError(format!("no service binding tagged `{tag}`")))
    }

    /// Extracts the on-premise SOCKS5 proxy from the connectivity binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the binding or its proxy fields are missing.
    pub fn connectivity_proxy(&self) -> Result<ConnectivityProxy, Error> {
        let credentials = self.credentials(CONNECTIVITY_SERVICE)?;
        let host = credentials.onpremise_proxy_host.clone().ok_or_else(|| {
            Error::ConfigError("connectivity binding lacks onpremise_proxy_host".to_string())
        })?;
        let port = credentials.onpremise_socks5_proxy_port.ok_or_else(|| {
            Error::ConfigError(
                "connectivity binding lacks onpremise_socks5_proxy_port".to_string(),
            )
        })?;
        Ok(ConnectivityProxy { host, port })
    }
}

/// A single service binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceBinding {
    /// Instance name of the binding
    #[serde(default)]
    pub name: String,

    /// Service label (taken from the enclosing key when absent)
    #[serde(default)]
    pub label: Option<String>,

    /// Tags attached to the service offering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Binding credentials
    pub credentials: ServiceCredentials,
}

/// Credentials block of a service binding.
///
/// Only the fields the lookup service uses are modelled; everything else is ignored.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServiceCredentials {
    /// OAuth client id
    #[serde(default)]
    pub clientid: Option<String>,

    /// OAuth client secret
    #[serde(default)]
    pub clientsecret: Option<SecretString>,

    /// Token service base URL (connectivity bindings)
    #[validate(url)]
    #[serde(default)]
    pub token_service_url: Option<String>,

    /// Authorization server base URL (XSUAA-style bindings)
    #[validate(url)]
    #[serde(default)]
    pub url: Option<String>,

    /// On-premise proxy host
    #[serde(default)]
    pub onpremise_proxy_host: Option<String>,

    /// On-premise SOCKS5 proxy port
    #[serde(default, deserialize_with = "deserialize_port")]
    pub onpremise_socks5_proxy_port: Option<u16>,
}

impl ServiceCredentials {
    /// Returns the client-credentials token endpoint (`<base>/oauth/token`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if neither `token_service_url` nor `url` is present.
    pub fn token_endpoint(&self) -> Result<Url, Error> {
        let base = self
            .token_service_url
            .as_deref()
            .or(self.url.as_deref())
            .ok_or_else(|| Error::ConfigError("binding has no token service URL".to_string()))?;

        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(TOKEN_PATH)?)
    }
}

/// Address of the connectivity SOCKS5 proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityProxy {
    /// Proxy host
    pub host: String,
    /// SOCKS5 port
    pub port: u16,
}

// Cloud Foundry renders ports as JSON strings; accept numbers too.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const VCAP: &str = r#"{
        "connectivity": [{
            "name": "lookup-connectivity",
            "tags": ["connectivity", "conn", "connsvc"],
            "credentials": {
                "clientid": "sb-clone-connectivity",
                "clientsecret": "s3cr3t",
                "token_service_url": "https://tenant.authentication.example.com",
                "onpremise_proxy_host": "connectivityproxy.internal.example.com",
                "onpremise_proxy_port": "20003",
                "onpremise_socks5_proxy_port": "20004"
            }
        }],
        "xsuaa": [{
            "name": "lookup-uaa",
            "tags": ["xsuaa"],
            "credentials": {
                "clientid": "sb-lookup",
                "clientsecret": "other",
                "url": "https://tenant.authentication.example.com/"
            }
        }]
    }"#;

    #[test]
    fn test_parse_vcap_services() {
        let bindings = ServiceBindings::from_vcap_services(VCAP).unwrap();
        assert_eq!(
            bindings.find("xsuaa").map(|b| b.name.as_str()),
            Some("lookup-uaa")
        );

        let creds = bindings.credentials(CONNECTIVITY_SERVICE).unwrap();
        assert_eq!(creds.clientid.as_deref(), Some("sb-clone-connectivity"));
        assert_eq!(
            creds.clientsecret.as_ref().map(|s| s.expose_secret().to_string()),
            Some("s3cr3t".to_string())
        );
        assert_eq!(creds.onpremise_socks5_proxy_port, Some(20004));
    }

    #[test]
    fn test_connectivity_proxy() {
        let bindings = ServiceBindings::from_vcap_services(VCAP).unwrap();
        let proxy = bindings.connectivity_proxy().unwrap();
        assert_eq!(proxy.host, "connectivityproxy.internal.example.com");
        assert_eq!(proxy.port, 20004);
    }

    #[test]
    fn test_find_by_label_when_untagged() {
        let raw = r#"{"connectivity": [{"name": "c", "credentials": {"onpremise_socks5_proxy_port": 20004}}]}"#;
        let bindings = ServiceBindings::from_vcap_services(raw).unwrap();
        let binding = bindings.find(CONNECTIVITY_SERVICE).unwrap();
        assert_eq!(binding.label.as_deref(), Some("connectivity"));
        assert_eq!(binding.credentials.onpremise_socks5_proxy_port, Some(20004));
    }

    #[test]
    fn test_missing_binding() {
        let bindings = ServiceBindings::from_vcap_services("{}").unwrap();
        assert!(bindings.find(CONNECTIVITY_SERVICE).is_none());
        assert!(matches!(
            bindings.connectivity_proxy(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_port() {
        let raw = r#"{"connectivity": [{"name": "c", "credentials": {"onpremise_socks5_proxy_port": "socks"}}]}"#;
        assert!(matches!(
            ServiceBindings::from_vcap_services(raw),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_token_url_rejected() {
        let raw = r#"{"connectivity": [{"name": "c", "credentials": {"token_service_url": "not a url"}}]}"#;
        assert!(matches!(
            ServiceBindings::from_vcap_services(raw),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_token_endpoint() {
        let bindings = ServiceBindings::from_vcap_services(VCAP).unwrap();

        let connectivity = bindings.credentials(CONNECTIVITY_SERVICE).unwrap();
        assert_eq!(
            connectivity.token_endpoint().unwrap().as_str(),
            "https://tenant.authentication.example.com/oauth/token"
        );

        let xsuaa = bindings.credentials("xsuaa").unwrap();
        assert_eq!(
            xsuaa.token_endpoint().unwrap().as_str(),
            "https://tenant.authentication.example.com/oauth/token"
        );
    }
}
