//! Directory bind credentials.
//!
//! The bind principal is the account the lookup service authenticates as before every search.
//! The secret is held in a [`SecretString`] so it never appears in `Debug` output or serialized
//! configuration.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Credentials used for the directory simple bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindCredentials {
    /// Bind principal (a DN or a `user@domain` UPN)
    pub principal: String,

    /// Bind secret
    #[serde(skip_serializing)]
    pub secret: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Arguments
    ///
    /// * `principal` - The bind DN or user principal name
    /// * `secret` - The bind password
    #[must_use]
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Get the bind principal.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Get the bind secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Returns true if neither the principal nor the secret has been provided.
    ///
    /// The directory treats an empty simple bind as an anonymous bind, which the lookup service
    /// never wants.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.principal.is_empty() || self.secret.expose_secret().is_empty()
    }
}

impl Default for BindCredentials {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_credentials_accessors() {
        let creds = BindCredentials::new("svc-lookup@corp.example.com", "secret");
        assert_eq!(creds.principal(), "svc-lookup@corp.example.com");
        assert_eq!(creds.secret(), "secret");
        assert!(!creds.is_anonymous());
    }

    #[test]
    fn test_bind_credentials_anonymous() {
        assert!(BindCredentials::default().is_anonymous());
        assert!(BindCredentials::new("cn=svc,dc=example,dc=com", "").is_anonymous());
    }

    #[test]
    fn test_bind_credentials_serialization() {
        let creds = BindCredentials::new("cn=svc,dc=example,dc=com", "hunter2");

        let json = serde_json::to_string(&creds).unwrap();
        // Secret should not be serialized
        assert!(!json.contains("hunter2"));
        assert!(json.contains("cn=svc,dc=example,dc=com"));
    }

    #[test]
    fn test_bind_credentials_debug_redacts_secret() {
        let creds = BindCredentials::new("cn=svc,dc=example,dc=com", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_bind_credentials_deserialization() {
        let creds: BindCredentials = serde_json::from_str(
            r#"{"principal": "cn=svc,dc=example,dc=com", "secret": "hunter2"}"#,
        )
        .unwrap();
        assert_eq!(creds.secret(), "hunter2");
    }
}
