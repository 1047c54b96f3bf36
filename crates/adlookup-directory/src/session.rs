//! Directory sessions established over the connectivity tunnel.

use crate::{
    config::DirectoryEndpointConfig,
    search::{DirectoryEntry, SearchOutcome, SearchRequest},
    transport::{self, AbortOnDrop, LoopbackRelay},
    Result,
};
use adlookup_connectivity::{TokenProvider, TunnelHandle, TunnelProvisioner, TunnelRequest};
use adlookup_core::config::{ConnectivityProxy, CONNECTIVITY_SERVICE};
use adlookup_core::Error;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, SearchEntry, SearchOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::{debug, error, warn};

/// LDAP result code for invalid credentials.
const INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code for a size-limited search.
const SIZE_LIMIT_EXCEEDED: u32 = 4;

/// A bound directory session.
///
/// Owned by one operation; never shared.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Runs one search to completion.
    async fn search(&mut self, request: &SearchRequest) -> SearchOutcome;

    /// Unbinds and closes the session. Calling it again is a no-op.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens bound directory sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionEstablisher: Send + Sync {
    /// Opens and binds a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TunnelFailure`], [`Error::ProtocolError`], [`Error::BindFailure`] or
    /// [`Error::IdleTimeout`]. Anything partially opened is closed before returning.
    async fn establish(&self) -> Result<Box<dyn DirectorySession>>;
}

/// Establishes sessions through the connectivity proxy with a fresh token each time.
pub struct TunneledSessionEstablisher {
    config: Arc<DirectoryEndpointConfig>,
    tokens: Arc<dyn TokenProvider>,
    tunnels: Arc<dyn TunnelProvisioner>,
    proxy: ConnectivityProxy,
    tls: TlsConnector,
}

impl TunneledSessionEstablisher {
    /// Creates an establisher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the trust anchor is not valid PEM.
    pub fn new(
        config: Arc<DirectoryEndpointConfig>,
        tokens: Arc<dyn TokenProvider>,
        tunnels: Arc<dyn TunnelProvisioner>,
        proxy: ConnectivityProxy,
    ) -> Result<Self> {
        let tls = transport::tls_connector(config.ca_certificate())?;
        Ok(Self {
            config,
            tokens,
            tunnels,
            proxy,
            tls,
        })
    }
}

#[async_trait]
impl SessionEstablisher for TunneledSessionEstablisher {
    async fn establish(&self) -> Result<Box<dyn DirectorySession>> {
        let token = self.tokens.token(CONNECTIVITY_SERVICE).await.map_err(|err| {
            error!(error = %err, "failed to obtain connectivity token");
            err
        })?;

        let request = TunnelRequest {
            location_tag: self.config.virtual_location().to_string(),
            auth_token: token,
            remote_host: self.config.virtual_host().to_string(),
            remote_port: self.config.virtual_port(),
            proxy_host: self.proxy.host.clone(),
            proxy_port: self.proxy.port,
        };
        let tunnel = self.tunnels.open_tunnel(&request).await.map_err(|err| {
            error!(error = %err, remote = %request.remote(), "failed to open tunnel");
            err
        })?;
        check_provenance(&tunnel, &request)?;
        debug!(
            location = tunnel.location_tag(),
            remote = tunnel.remote(),
            "tunnel opened"
        );

        let session = LdapDirectorySession::connect(tunnel, &self.tls, &self.config)
            .await
            .map_err(|err| {
                error!(error = %err, url = %self.config.ldaps_url(), "failed to establish directory session");
                err
            })?;
        Ok(Box::new(session))
    }
}

/// LDAP session over TLS over the tunnel.
struct LdapDirectorySession {
    ldap: Ldap,
    idle_timeout: Duration,
    closed: bool,
    driver: AbortOnDrop<()>,
    relay: AbortOnDrop<()>,
}

impl LdapDirectorySession {
    /// Connects and binds.
    ///
    /// Ready only once the TLS handshake is bridged and the bind is acknowledged. Both run
    /// concurrently; the first failure or the idle timeout aborts the other.
    async fn connect(
        tunnel: TunnelHandle,
        tls: &TlsConnector,
        config: &DirectoryEndpointConfig,
    ) -> Result<Self> {
        let idle_timeout = config.idle_timeout();
        let relay = LoopbackRelay::bind().await?;
        let url = relay.url();
        let domain = config.real_host();

        let bridged = async move {
            let stream = transport::secure(tls, domain, tunnel.into_stream()).await?;
            relay.bridge(stream).await
        };

        let client = async {
            let settings = LdapConnSettings::new().set_conn_timeout(idle_timeout);
            let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
                .await
                .map_err(|err| Error::ProtocolError(format!("LDAP connect failed: {err}")))?;
            let driver = AbortOnDrop::new(tokio::spawn(async move {
                if let Err(err) = conn.drive().await {
                    warn!(error = %err, "LDAP connection driver error");
                }
            }));

            let credentials = config.credentials();
            let result = ldap
                .simple_bind(credentials.principal(), credentials.secret())
                .await
                .map_err(|err| Error::ProtocolError(format!("LDAP bind failed: {err}")))?;
            check_bind(result.rc, &result.text)?;
            debug!(principal = credentials.principal(), "bound to directory");
            Ok::<_, Error>((ldap, driver))
        };

        let (relay, (ldap, driver)) = timeout(idle_timeout, async {
            tokio::try_join!(bridged, client)
        })
        .await
        .map_err(|_| {
            Error::IdleTimeout(format!(
                "directory session not ready within {} ms",
                idle_timeout.as_millis()
            ))
        })??;

        Ok(Self {
            ldap,
            idle_timeout,
            closed: false,
            driver,
            relay,
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.driver.abort();
        self.relay.abort();
    }

    fn outcome_for(&mut self, failure: StreamFailure) -> SearchOutcome {
        match failure {
            StreamFailure::Idle => {
                self.close();
                SearchOutcome::Errored(Error::IdleTimeout(format!(
                    "directory idle for more than {} ms",
                    self.idle_timeout.as_millis()
                )))
            }
            StreamFailure::Ldap(err) if is_transport_closed(&err) => {
                self.close();
                SearchOutcome::Closed(format!("Socket closed: {err}"))
            }
            StreamFailure::Ldap(err) => SearchOutcome::Errored(Error::SearchError(err.to_string())),
        }
    }
}

enum StreamFailure {
    Idle,
    Ldap(LdapError),
}

#[async_trait]
impl DirectorySession for LdapDirectorySession {
    async fn search(&mut self, request: &SearchRequest) -> SearchOutcome {
        if self.closed {
            return SearchOutcome::Closed("session already closed".to_string());
        }

        match stream_entries(&mut self.ldap, request, self.idle_timeout).await {
            Ok((entries, rc, text)) => completed_outcome(entries, rc, &text),
            Err(failure) => self.outcome_for(failure),
        }
    }

    async fn unbind(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = timeout(self.idle_timeout, self.ldap.unbind()).await;
        self.close();
        match result {
            Ok(Ok(())) => {
                debug!("directory session unbound");
                Ok(())
            }
            Ok(Err(err)) if is_transport_closed(&err) => {
                Err(Error::SocketClosed(format!("unbind failed: {err}")))
            }
            Ok(Err(err)) => Err(Error::ProtocolError(format!("unbind failed: {err}"))),
            Err(_) => Err(Error::IdleTimeout("unbind timed out".to_string())),
        }
    }
}

async fn stream_entries(
    ldap: &mut Ldap,
    request: &SearchRequest,
    idle_timeout: Duration,
) -> std::result::Result<(Vec<DirectoryEntry>, u32, String), StreamFailure> {
    let attributes: Vec<&str> = request.attributes.iter().map(String::as_str).collect();
    let size_limit = i32::try_from(request.size_limit).unwrap_or(i32::MAX);

    // A failure to start the search is final; nothing is streamed after it.
    let mut stream = timeout(
        idle_timeout,
        ldap.with_search_options(SearchOptions::new().sizelimit(size_limit))
            .streaming_search(
                &request.base,
                request.scope.into(),
                &request.filter,
                attributes,
            ),
    )
    .await
    .map_err(|_| StreamFailure::Idle)?
    .map_err(StreamFailure::Ldap)?;

    let mut entries = Vec::new();
    while let Some(entry) = timeout(idle_timeout, stream.next())
        .await
        .map_err(|_| StreamFailure::Idle)?
        .map_err(StreamFailure::Ldap)?
    {
        let entry = SearchEntry::construct(entry);
        debug!(dn = %entry.dn, "search entry received");
        entries.push(DirectoryEntry::from(entry));
    }

    let result = timeout(idle_timeout, stream.finish())
        .await
        .map_err(|_| StreamFailure::Idle)?;
    debug!(rc = result.rc, "search result end status");
    Ok((entries, result.rc, result.text))
}

/// Maps the result code of a search that ran to its end.
fn completed_outcome(entries: Vec<DirectoryEntry>, rc: u32, text: &str) -> SearchOutcome {
    match rc {
        0 => SearchOutcome::Completed {
            entries,
            truncated: false,
        },
        SIZE_LIMIT_EXCEEDED => SearchOutcome::Completed {
            entries,
            truncated: true,
        },
        _ => SearchOutcome::Errored(Error::SearchError(format!(
            "search failed with code {rc}: {text}"
        ))),
    }
}

/// The tunnel must carry the location and token it was requested with.
fn check_provenance(tunnel: &TunnelHandle, request: &TunnelRequest) -> Result<()> {
    if tunnel.location_tag() != request.location_tag
        || tunnel.remote() != request.remote()
        || tunnel.token().secret() != request.auth_token.secret()
    {
        error!(
            requested = %request.location_tag,
            opened = tunnel.location_tag(),
            "tunnel provenance does not match the request"
        );
        return Err(Error::TunnelFailure(format!(
            "tunnel opened for {} at {} does not match the requested endpoint",
            tunnel.location_tag(),
            tunnel.remote()
        )));
    }
    Ok(())
}

fn check_bind(rc: u32, text: &str) -> Result<()> {
    match rc {
        0 => Ok(()),
        INVALID_CREDENTIALS => Err(Error::BindFailure(format!(
            "invalid credentials (code {rc}): {text}"
        ))),
        _ => Err(Error::BindFailure(format!("bind failed with code {rc}: {text}"))),
    }
}

fn is_transport_closed(err: &LdapError) -> bool {
    matches!(
        err,
        LdapError::EndOfStream
            | LdapError::Io { .. }
            | LdapError::ResultRecv { .. }
            | LdapError::OpSend { .. }
    )
}
