//! Connectivity collaborators for reaching a directory inside a private network.
//!
//! The directory server is not routable from where the lookup service runs. A cloud
//! connectivity broker bridges the gap: an OAuth token authorises the caller and a SOCKS5 proxy
//! opens a TCP stream to a virtual host that the broker maps onto the on-premise server.
//!
//! Both collaborators sit behind traits ([`TokenProvider`], [`TunnelProvisioner`]) so the
//! directory crate can be exercised without the broker.

#![deny(missing_docs)]

mod socks5;
mod token;
mod tunnel;

pub use socks5::{Socks5TunnelProvisioner, DEFAULT_HANDSHAKE_TIMEOUT_SECS};
pub use token::{AccessToken, ClientCredentialsTokenProvider, TokenProvider};
pub use tunnel::{TunnelHandle, TunnelProvisioner, TunnelRequest, TunnelStream};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adlookup_core::Result<T>;
