//! TLS over the tunnel, bridged to the LDAP client.
//!
//! The LDAP client connects by URL, so the secured tunnel is exposed on a single-use loopback
//! listener and the two streams are spliced together.

use crate::Result;
use adlookup_connectivity::TunnelStream;
use adlookup_core::Error;
use native_tls::Certificate;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::debug;

/// Task handle that aborts the task when dropped.
#[derive(Debug)]
pub(crate) struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub(crate) fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    pub(crate) fn abort(&self) {
        self.0.abort();
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Builds the TLS connector, trusting `ca_pem` in addition to the system roots.
pub(crate) fn tls_connector(ca_pem: Option<&[u8]>) -> Result<TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(pem) = ca_pem {
        let certificate = Certificate::from_pem(pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        builder.add_root_certificate(certificate);
    }
    let connector = builder.build().map_err(|err| {
        Error::ConfigError(format!("failed to construct TLS connector: {err}"))
    })?;
    Ok(TlsConnector::from(connector))
}

/// Runs the TLS handshake over an open tunnel, verifying `domain`.
pub(crate) async fn secure(
    connector: &TlsConnector,
    domain: &str,
    stream: Box<dyn TunnelStream>,
) -> Result<TlsStream<Box<dyn TunnelStream>>> {
    let stream = connector
        .connect(domain, stream)
        .await
        .map_err(|err| Error::ProtocolError(format!("TLS handshake with {domain} failed: {err}")))?;
    debug!(domain, "TLS connection established over tunnel");
    Ok(stream)
}

/// Single-use loopback listener feeding one upstream stream.
#[derive(Debug)]
pub(crate) struct LoopbackRelay {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LoopbackRelay {
    pub(crate) async fn bind() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|err| Error::InternalError(format!("failed to bind loopback relay: {err}")))?;
        let addr = listener
            .local_addr()
            .map_err(|err| Error::InternalError(format!("loopback relay has no address: {err}")))?;
        Ok(Self { listener, addr })
    }

    /// Plain `ldap://` URL of the relay.
    pub(crate) fn url(&self) -> String {
        format!("ldap://{}", self.addr)
    }

    /// Accepts the LDAP client's connection and splices it onto `upstream`.
    ///
    /// The listener is closed once the single connection is accepted.
    pub(crate) async fn bridge<S>(self, mut upstream: S) -> Result<AbortOnDrop<()>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut local, peer) = self.listener.accept().await.map_err(Error::from)?;
        drop(self.listener);
        local.set_nodelay(true).ok();
        debug!(%peer, "LDAP client attached to relay");

        let task = tokio::spawn(async move {
            match copy_bidirectional(&mut local, &mut upstream).await {
                Ok((sent, received)) => debug!(sent, received, "relay closed"),
                Err(err) => debug!(error = %err, "relay closed with error"),
            }
        });
        Ok(AbortOnDrop::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn relay_splices_streams() {
        let relay = LoopbackRelay::bind().await.unwrap();
        let addr = relay.addr;
        assert!(relay.url().starts_with("ldap://127.0.0.1:"));

        let (upstream, mut remote) = duplex(64);
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let _task = relay.bridge(upstream).await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        remote.write_all(b"pong").await.unwrap();

        assert_eq!(&client.await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn dropping_task_handle_stops_relay() {
        let relay = LoopbackRelay::bind().await.unwrap();
        let addr = relay.addr;
        let (upstream, mut remote) = duplex(64);
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let task = relay.bridge(upstream).await.unwrap();
        let _client = connect.await.unwrap();
        drop(task);

        let mut buf = [0u8; 1];
        let read = remote.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }

    #[test]
    fn rejects_invalid_ca() {
        let result = tls_connector(Some(b"not a certificate"));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn builds_without_ca() {
        assert!(tls_connector(None).is_ok());
    }
}
