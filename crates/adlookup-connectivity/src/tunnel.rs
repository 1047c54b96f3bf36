//! Tunnel provisioning interface.

use crate::{AccessToken, Result};
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream bridging to the private network.
///
/// Implemented for every `AsyncRead + AsyncWrite` stream so provisioners can hand back a
/// `TcpStream`, a TLS stream or an in-memory duplex in tests.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Parameters for opening a tunnel.
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    /// Connectivity location tag identifying the on-premise connector.
    pub location_tag: String,
    /// Token authorising the tunnel.
    pub auth_token: AccessToken,
    /// Virtual host exposed by the connector.
    pub remote_host: String,
    /// Virtual port exposed by the connector.
    pub remote_port: u16,
    /// Host of the connectivity proxy.
    pub proxy_host: String,
    /// SOCKS5 port of the connectivity proxy.
    pub proxy_port: u16,
}

impl TunnelRequest {
    /// `host:port` of the requested virtual endpoint.
    #[must_use]
    pub fn remote(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// An open tunnel plus the provenance it was requested with.
///
/// Dropping the handle closes the underlying stream.
pub struct TunnelHandle {
    stream: Box<dyn TunnelStream>,
    location_tag: String,
    remote: String,
    token: AccessToken,
}

impl TunnelHandle {
    /// Wraps an established stream.
    #[must_use]
    pub fn new(stream: Box<dyn TunnelStream>, request: &TunnelRequest) -> Self {
        Self {
            stream,
            location_tag: request.location_tag.clone(),
            remote: request.remote(),
            token: request.auth_token.clone(),
        }
    }

    /// Location tag the tunnel was opened for.
    #[must_use]
    pub fn location_tag(&self) -> &str {
        &self.location_tag
    }

    /// Virtual `host:port` the tunnel reaches.
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Token the tunnel was authorised with.
    #[must_use]
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Releases the stream, consuming the handle.
    #[must_use]
    pub fn into_stream(self) -> Box<dyn TunnelStream> {
        self.stream
    }
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("location_tag", &self.location_tag)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Opens byte streams to hosts inside the private network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    /// Opens a tunnel to `request.remote_host:request.remote_port`.
    ///
    /// # Errors
    ///
    /// Returns [`adlookup_core::Error::TunnelFailure`] if the proxy cannot be reached or refuses
    /// the connection.
    async fn open_tunnel(&self, request: &TunnelRequest) -> Result<TunnelHandle>;
}
