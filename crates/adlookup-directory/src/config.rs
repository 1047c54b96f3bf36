//! Configuration types for the directory endpoint.

use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::{search::SearchScope, Result};
use adlookup_core::credentials::BindCredentials;
use adlookup_core::Error;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Default idle timeout (milliseconds).
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;
/// Default maximum number of entries returned by one search.
pub const DEFAULT_SIZE_LIMIT: u32 = 1000;

/// Environment variable holding the bind principal.
pub const BIND_USER_ENV: &str = "bindUser";
/// Environment variable holding the bind secret.
pub const BIND_PASS_ENV: &str = "bindPass";
/// Environment variable holding the search size limit.
pub const SIZE_LIMIT_ENV: &str = "sizeLimit";

const DEFAULT_VIRTUAL_HOST: &str = "tcp.domain.xyz.com";
const DEFAULT_VIRTUAL_LOCATION: &str = "Domain_Location";
const DEFAULT_REAL_HOST: &str = "domain.xyz.com";
const DEFAULT_LDAPS_PORT: u16 = 3269;

/// Directory attribute names used by the lookups.
///
/// Defaults match Active Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAttributes {
    /// Object class of user entries.
    pub user_class: String,
    /// Account identifier (login name).
    pub account_id: String,
    /// Attribute used as the record `id`.
    pub display_name: String,
    /// Group membership (list of group DNs).
    pub member_of: String,
    /// First name as returned for role listings.
    pub first_name: String,
    /// Last name as returned for role listings.
    pub last_name: String,
    /// Mail address.
    pub mail: String,
    /// Legal given name, mapped to `firstName` for user info.
    pub legal_given_name: String,
    /// Legal surname, mapped to `lastName` for user info.
    pub legal_surname: String,
}

impl Default for SchemaAttributes {
    fn default() -> Self {
        Self {
            user_class: "user".to_string(),
            account_id: "sAMAccountName".to_string(),
            display_name: "cn".to_string(),
            member_of: "memberOf".to_string(),
            first_name: "firstname".to_string(),
            last_name: "lastname".to_string(),
            mail: "mail".to_string(),
            legal_given_name: "givenName".to_string(),
            legal_surname: "sn".to_string(),
        }
    }
}

/// Configuration for reaching and querying the directory.
///
/// Built once at start-up and shared read-only between operations.
#[derive(Debug, Clone, Validate)]
pub struct DirectoryEndpointConfig {
    #[validate(length(min = 1))]
    virtual_host: String,
    #[validate(range(min = 1))]
    virtual_port: u16,
    virtual_location: String,
    #[validate(length(min = 1))]
    real_host: String,
    #[validate(range(min = 1))]
    real_port: u16,
    base_dn: DistinguishedName,
    scope: SearchScope,
    role_base_dn: DistinguishedName,
    ca_certificate: Option<Vec<u8>>,
    credentials: BindCredentials,
    #[validate(range(min = 1))]
    idle_timeout_ms: u64,
    #[validate(range(min = 1, max = 2_147_483_647))]
    size_limit: u32,
    attributes: SchemaAttributes,
}

impl DirectoryEndpointConfig {
    /// Creates a configuration with the given credentials and search base.
    #[must_use]
    pub fn new(credentials: BindCredentials, base_dn: DistinguishedName) -> Self {
        Self {
            virtual_host: DEFAULT_VIRTUAL_HOST.to_string(),
            virtual_port: DEFAULT_LDAPS_PORT,
            virtual_location: DEFAULT_VIRTUAL_LOCATION.to_string(),
            real_host: DEFAULT_REAL_HOST.to_string(),
            real_port: DEFAULT_LDAPS_PORT,
            base_dn,
            scope: SearchScope::Subtree,
            role_base_dn: default_role_base_dn(),
            ca_certificate: None,
            credentials,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            size_limit: DEFAULT_SIZE_LIMIT,
            attributes: SchemaAttributes::default(),
        }
    }

    /// Checks field ranges and that bind credentials are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid directory configuration: {e}")))?;
        if self.credentials.is_anonymous() {
            return Err(Error::ConfigError(
                "directory bind credentials are not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Virtual host the connector exposes.
    #[must_use]
    pub fn virtual_host(&self) -> &str {
        &self.virtual_host
    }

    /// Virtual port the connector exposes.
    #[must_use]
    pub const fn virtual_port(&self) -> u16 {
        self.virtual_port
    }

    /// Connector location tag.
    #[must_use]
    pub fn virtual_location(&self) -> &str {
        &self.virtual_location
    }

    /// Real directory host; the TLS certificate is verified against this name.
    #[must_use]
    pub fn real_host(&self) -> &str {
        &self.real_host
    }

    /// Real directory port.
    #[must_use]
    pub const fn real_port(&self) -> u16 {
        self.real_port
    }

    /// `ldaps://` URL of the real directory, used in log output.
    #[must_use]
    pub fn ldaps_url(&self) -> String {
        format!("ldaps://{}:{}", self.real_host, self.real_port)
    }

    /// Search base.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Search scope.
    #[must_use]
    pub const fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Container under which role groups live.
    #[must_use]
    pub const fn role_base_dn(&self) -> &DistinguishedName {
        &self.role_base_dn
    }

    /// PEM trust anchor, if one is configured.
    #[must_use]
    pub fn ca_certificate(&self) -> Option<&[u8]> {
        self.ca_certificate.as_deref()
    }

    /// Bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Maximum number of entries per search.
    #[must_use]
    pub const fn size_limit(&self) -> u32 {
        self.size_limit
    }

    /// Schema attribute names.
    #[must_use]
    pub const fn attributes(&self) -> &SchemaAttributes {
        &self.attributes
    }

    /// Overrides the virtual endpoint and connector location.
    #[must_use]
    pub fn with_virtual_endpoint(
        mut self,
        host: impl Into<String>,
        port: u16,
        location: impl Into<String>,
    ) -> Self {
        self.virtual_host = host.into();
        self.virtual_port = port;
        self.virtual_location = location.into();
        self
    }

    /// Overrides the real directory endpoint.
    #[must_use]
    pub fn with_real_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.real_host = host.into();
        self.real_port = port;
        self
    }

    /// Overrides the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Overrides the container under which role groups live.
    #[must_use]
    pub fn with_role_base_dn(mut self, dn: DistinguishedName) -> Self {
        self.role_base_dn = dn;
        self
    }

    /// Sets the PEM trust anchor.
    #[must_use]
    pub fn with_ca_certificate(mut self, pem: Vec<u8>) -> Self {
        self.ca_certificate = Some(pem);
        self
    }

    /// Reads the PEM trust anchor from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file cannot be read.
    pub fn with_ca_certificate_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                path.display()
            ))
        })?;
        Ok(self.with_ca_certificate(pem))
    }

    /// Replaces the bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Overrides the idle timeout in milliseconds.
    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, millis: u64) -> Self {
        self.idle_timeout_ms = millis;
        self
    }

    /// Overrides the size limit.
    #[must_use]
    pub const fn with_size_limit(mut self, size_limit: u32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Overrides the schema attribute names.
    #[must_use]
    pub fn with_attributes(mut self, attributes: SchemaAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Applies `bindUser`, `bindPass` and `sizeLimit` from `lookup`.
    ///
    /// Unset variables leave the current values in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `sizeLimit` is not a positive integer.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let principal = lookup(BIND_USER_ENV);
        let secret = lookup(BIND_PASS_ENV);
        if principal.is_some() || secret.is_some() {
            self.credentials = BindCredentials::new(
                principal.unwrap_or_else(|| self.credentials.principal().to_string()),
                secret.unwrap_or_else(|| self.credentials.secret().to_string()),
            );
        }

        if let Some(raw) = lookup(SIZE_LIMIT_ENV) {
            self.size_limit = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| {
                    Error::ConfigError(format!("{SIZE_LIMIT_ENV} must be a positive integer, got `{raw}`"))
                })?;
        }
        Ok(self)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::with_env_overrides`].
    pub fn with_process_env(self) -> Result<Self> {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }
}

fn default_role_base_dn() -> DistinguishedName {
    DistinguishedName::from_rdns([
        RelativeDistinguishedName::new("cn", "read-only-admin"),
        RelativeDistinguishedName::new("dc", "example"),
        RelativeDistinguishedName::new("dc", "com"),
    ])
}
