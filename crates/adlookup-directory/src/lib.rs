//! Directory lookups over a tunneled LDAP connection.
//!
//! Resolves role members, user details and group memberships from an Active Directory that is
//! only reachable through the connectivity proxy. Each lookup is translated into a filter, run
//! on a fresh session behind a shared [`SerializationGate`], and shaped into a
//! [`LookupResult`].

#![deny(missing_docs)]

mod client;
mod config;
mod dn;
mod filter;
mod gate;
mod intent;
mod operations;
mod search;
mod session;
mod shaper;
mod transport;

pub use client::DirectoryClient;
pub use config::{
    DirectoryEndpointConfig, SchemaAttributes, BIND_PASS_ENV, BIND_USER_ENV,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_SIZE_LIMIT, SIZE_LIMIT_ENV,
};
pub use dn::{leading_rdn_value, DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use filter::{escape_filter_value, Filter};
pub use gate::SerializationGate;
pub use intent::{build_query, DirectoryQuery, SearchIntent, MAX_USER_INFO_IDENTIFIERS, NO_ATTRIBUTES};
pub use operations::{DirectoryOperations, OperationResponse, GUIDANCE_MESSAGE};
pub use search::{execute_search, DirectoryEntry, SearchOutcome, SearchRequest, SearchScope};
pub use session::{DirectorySession, SessionEstablisher, TunneledSessionEstablisher};
pub use shaper::{
    locale_cmp, shape, AttributeValue, LookupResult, PresenceStatus, UserRecord, USER_NOT_FOUND,
    USER_PRESENT,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adlookup_core::Result<T>;
