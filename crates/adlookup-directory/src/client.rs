//! Directory client: translate, serialize, search, shape.

use crate::{
    config::DirectoryEndpointConfig,
    gate::SerializationGate,
    intent::{build_query, SearchIntent},
    search::{execute_search, SearchRequest},
    session::{SessionEstablisher, TunneledSessionEstablisher},
    shaper::{shape, LookupResult},
    Result,
};
use adlookup_connectivity::{ClientCredentialsTokenProvider, Socks5TunnelProvisioner};
use adlookup_core::config::ServiceBindings;
use std::sync::Arc;
use tracing::{debug, error};

/// Directory client with a pluggable session backend.
///
/// Every lookup opens its own session, and all lookups sharing a gate run one at a time.
pub struct DirectoryClient {
    config: Arc<DirectoryEndpointConfig>,
    gate: Arc<SerializationGate>,
    establisher: Arc<dyn SessionEstablisher>,
}

impl DirectoryClient {
    /// Creates a client that reaches the directory through the connectivity proxy.
    ///
    /// # Errors
    ///
    /// Returns [`adlookup_core::Error::ConfigError`] if the configuration is invalid or the
    /// connectivity binding is missing.
    pub fn new(
        config: DirectoryEndpointConfig,
        gate: Arc<SerializationGate>,
        bindings: &ServiceBindings,
    ) -> Result<Self> {
        config.check()?;
        let config = Arc::new(config);
        let proxy = bindings.connectivity_proxy()?;
        let tokens = ClientCredentialsTokenProvider::new(bindings.clone())?;
        let establisher = TunneledSessionEstablisher::new(
            config.clone(),
            Arc::new(tokens),
            Arc::new(Socks5TunnelProvisioner::new()),
            proxy,
        )?;

        Ok(Self {
            config,
            gate,
            establisher: Arc::new(establisher),
        })
    }

    /// Creates a client with a custom session establisher.
    #[must_use]
    pub fn with_establisher(
        config: DirectoryEndpointConfig,
        gate: Arc<SerializationGate>,
        establisher: Arc<dyn SessionEstablisher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gate,
            establisher,
        }
    }

    /// Endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryEndpointConfig {
        &self.config
    }

    /// Runs one lookup.
    ///
    /// The intent is translated before the gate is taken, so invalid input never waits for or
    /// touches the directory. The session is closed before the gate is released.
    ///
    /// # Errors
    ///
    /// Returns the translation, establishment or search error unchanged.
    pub async fn lookup(&self, intent: &SearchIntent) -> Result<LookupResult> {
        let operation = intent.operation_name();
        let query = build_query(intent, &self.config)?;
        let request = SearchRequest::new(&self.config, &query);
        debug!(operation, filter = %request.filter, "translated lookup");

        let entries = self
            .gate
            .run(operation, async {
                let session = self.establisher.establish().await?;
                execute_search(session, &request).await
            })
            .await
            .map_err(|err| {
                if err.should_log() {
                    error!(operation, error = %err, "directory lookup failed");
                }
                err
            })?;

        Ok(shape(intent, entries, self.config.attributes()))
    }

    /// Lists members of `role_group`, or checks whether `user_id` is one of them.
    ///
    /// # Errors
    ///
    /// See [`Self::lookup`].
    pub async fn users_in_role(
        &self,
        role_group: &str,
        user_id: Option<&str>,
    ) -> Result<LookupResult> {
        self.lookup(&SearchIntent::RoleMembers {
            role_group: role_group.to_string(),
            user_id: user_id.map(str::to_string),
        })
        .await
    }

    /// Fetches details for up to fifty accounts.
    ///
    /// # Errors
    ///
    /// See [`Self::lookup`].
    pub async fn user_info(&self, identifiers: &[String]) -> Result<LookupResult> {
        self.lookup(&SearchIntent::UserInfo {
            identifiers: identifiers.to_vec(),
        })
        .await
    }

    /// Lists the group names of one account.
    ///
    /// # Errors
    ///
    /// See [`Self::lookup`].
    pub async fn user_groups(&self, identifier: &str) -> Result<LookupResult> {
        self.lookup(&SearchIntent::UserGroups {
            identifier: identifier.to_string(),
        })
        .await
    }
}
