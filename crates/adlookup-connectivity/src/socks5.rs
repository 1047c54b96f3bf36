//! SOCKS5 tunnels through the connectivity proxy.
//!
//! The proxy speaks plain SOCKS5 (RFC 1928) with one private authentication method, `0x80`,
//! whose sub-negotiation carries the bearer token and the connector location:
//!
//! ```text
//! +-----+-----------+---------+---------+-------------------+
//! | VER | TOKEN LEN |  TOKEN  | LOC LEN | LOC (base64)      |
//! +-----+-----------+---------+---------+-------------------+
//! |  1  | 4 (BE)    | n bytes |    1    | m bytes           |
//! +-----+-----------+---------+---------+-------------------+
//! ```
//!
//! The proxy answers with `[0x01, status]`; status zero means success.

use crate::tunnel::{TunnelHandle, TunnelProvisioner, TunnelRequest};
use crate::Result;
use adlookup_core::Error;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error};

/// Default handshake timeout (seconds).
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

const SOCKS_VERSION: u8 = 0x05;
const AUTH_METHOD_TOKEN: u8 = 0x80;
const AUTH_METHOD_NONE_ACCEPTABLE: u8 = 0xff;
const AUTH_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Opens tunnels by negotiating SOCKS5 with the connectivity proxy.
#[derive(Debug, Clone)]
pub struct Socks5TunnelProvisioner {
    handshake_timeout: Duration,
}

impl Socks5TunnelProvisioner {
    /// Creates a provisioner with the default handshake timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }
}

impl Default for Socks5TunnelProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelProvisioner for Socks5TunnelProvisioner {
    async fn open_tunnel(&self, request: &TunnelRequest) -> Result<TunnelHandle> {
        let proxy = format!("{}:{}", request.proxy_host, request.proxy_port);
        debug!(%proxy, remote = %request.remote(), location = %request.location_tag, "opening tunnel");

        let stream = timeout(self.handshake_timeout, async {
            let mut stream = TcpStream::connect(&proxy).await.map_err(|err| {
                Error::TunnelFailure(format!("cannot reach connectivity proxy {proxy}: {err}"))
            })?;
            stream.set_nodelay(true).ok();
            handshake(&mut stream, request).await?;
            Ok::<_, Error>(stream)
        })
        .await
        .map_err(|_| Error::TunnelFailure(format!("SOCKS5 handshake with {proxy} timed out")))?
        .map_err(|err| {
            error!(%proxy, "tunnel provisioning failed: {err}");
            err
        })?;

        debug!(remote = %request.remote(), "tunnel established");
        Ok(TunnelHandle::new(Box::new(stream), request))
    }
}

/// Runs the full client side of the handshake on `stream`.
async fn handshake<S>(stream: &mut S, request: &TunnelRequest) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS_VERSION, 1, AUTH_METHOD_TOKEN])
        .await
        .map_err(io_failure)?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.map_err(io_failure)?;
    if reply[0] != SOCKS_VERSION {
        return Err(Error::TunnelFailure(format!(
            "proxy answered with SOCKS version {}",
            reply[0]
        )));
    }
    match reply[1] {
        AUTH_METHOD_TOKEN => {}
        AUTH_METHOD_NONE_ACCEPTABLE => {
            return Err(Error::TunnelFailure(
                "proxy rejected token authentication".to_string(),
            ))
        }
        other => {
            return Err(Error::TunnelFailure(format!(
                "proxy selected unsupported authentication method {other:#04x}"
            )))
        }
    }

    stream
        .write_all(&encode_auth(request.auth_token.secret(), &request.location_tag)?)
        .await
        .map_err(io_failure)?;
    stream.read_exact(&mut reply).await.map_err(io_failure)?;
    if reply[1] != 0 {
        return Err(Error::TunnelFailure(format!(
            "proxy authentication failed with status {}",
            reply[1]
        )));
    }

    stream
        .write_all(&encode_connect(&request.remote_host, request.remote_port)?)
        .await
        .map_err(io_failure)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.map_err(io_failure)?;
    if head[1] != 0 {
        return Err(Error::TunnelFailure(format!(
            "proxy refused CONNECT to {}: {}",
            request.remote(),
            reply_message(head[1])
        )));
    }

    // Drain the bound address; its value is irrelevant to the caller.
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.map_err(io_failure)?;
            usize::from(len[0])
        }
        other => {
            return Err(Error::TunnelFailure(format!(
                "proxy replied with unknown address type {other:#04x}"
            )))
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await.map_err(io_failure)?;
    Ok(())
}

fn encode_auth(token: &str, location_tag: &str) -> Result<Vec<u8>> {
    let token_len = u32::try_from(token.len())
        .map_err(|_| Error::TunnelFailure("token too long for SOCKS5 auth".to_string()))?;
    let location = if location_tag.is_empty() {
        String::new()
    } else {
        base64::engine::general_purpose::STANDARD.encode(location_tag)
    };
    let location_len = u8::try_from(location.len())
        .map_err(|_| Error::TunnelFailure("location tag too long for SOCKS5 auth".to_string()))?;

    let mut frame = Vec::with_capacity(6 + token.len() + location.len());
    frame.push(AUTH_VERSION);
    frame.extend_from_slice(&token_len.to_be_bytes());
    frame.extend_from_slice(token.as_bytes());
    frame.push(location_len);
    frame.extend_from_slice(location.as_bytes());
    Ok(frame)
}

fn encode_connect(host: &str, port: u16) -> Result<Vec<u8>> {
    let host_len = u8::try_from(host.len())
        .map_err(|_| Error::TunnelFailure(format!("host name `{host}` too long for SOCKS5")))?;

    let mut frame = Vec::with_capacity(7 + host.len());
    frame.extend_from_slice(&[SOCKS_VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host_len]);
    frame.extend_from_slice(host.as_bytes());
    frame.extend_from_slice(&port.to_be_bytes());
    Ok(frame)
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

fn io_failure(err: std::io::Error) -> Error {
    Error::TunnelFailure(format!("SOCKS5 handshake I/O error: {err}"))
}
