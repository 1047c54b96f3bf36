//! Bounded search execution.

use crate::{
    config::DirectoryEndpointConfig, intent::DirectoryQuery, session::DirectorySession, Result,
};
use adlookup_core::Error;
use ldap3::{Scope, SearchEntry};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// A directory entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map; values keep the order the server sent them in.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Creates an entry from its DN and attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Returns all values for the attribute. Attribute names compare case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// Keeps the text attributes only. Values the server returned as binary (not valid UTF-8,
/// such as `objectGUID`) are dropped; their names are logged at debug level.
impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        if !entry.bin_attrs.is_empty() {
            let mut dropped: Vec<&str> = entry.bin_attrs.keys().map(String::as_str).collect();
            dropped.sort_unstable();
            debug!(dn = %entry.dn, attributes = ?dropped, "dropping binary attribute values");
        }
        Self {
            dn: entry.dn,
            attributes: entry.attrs.into_iter().collect(),
        }
    }
}

/// A single non-paged search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base DN.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Rendered filter.
    pub filter: String,
    /// Attributes to return.
    pub attributes: Vec<String>,
    /// Maximum number of entries the server may return.
    pub size_limit: u32,
}

impl SearchRequest {
    /// Combines a translated query with the endpoint's base, scope and size limit.
    #[must_use]
    pub fn new(config: &DirectoryEndpointConfig, query: &DirectoryQuery) -> Self {
        Self {
            base: config.base_dn().to_string(),
            scope: config.scope(),
            filter: query.filter.to_string(),
            attributes: query.attributes.clone(),
            size_limit: config.size_limit(),
        }
    }
}

/// Terminal outcome of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The server finished the search.
    Completed {
        /// Entries in the order received.
        entries: Vec<DirectoryEntry>,
        /// True when the size limit cut the result short.
        truncated: bool,
    },
    /// The directory reported an error, or the session timed out while active.
    Errored(Error),
    /// The transport closed before the search finished.
    Closed(String),
}

/// Runs one search and tears the session down before surfacing the outcome.
///
/// The session is consumed: it is unbound on every path, and an unbind failure is logged
/// without masking the search outcome.
///
/// # Errors
///
/// Returns [`Error::SearchError`] or [`Error::IdleTimeout`] when the search errored and
/// [`Error::SocketClosed`] when the transport closed early.
pub async fn execute_search(
    mut session: Box<dyn DirectorySession>,
    request: &SearchRequest,
) -> Result<Vec<DirectoryEntry>> {
    debug!(base = %request.base, filter = %request.filter, "starting directory search");
    let outcome = session.search(request).await;

    if let Err(err) = session.unbind().await {
        warn!(error = %err, "failed to unbind directory session");
    }
    drop(session);

    match outcome {
        SearchOutcome::Completed { entries, truncated } => {
            if truncated {
                warn!(
                    size_limit = request.size_limit,
                    returned = entries.len(),
                    "directory search hit the size limit; result truncated"
                );
            }
            debug!(count = entries.len(), "directory search completed");
            Ok(entries)
        }
        SearchOutcome::Errored(err) => {
            error!(error = %err, filter = %request.filter, "directory search failed");
            Err(err)
        }
        SearchOutcome::Closed(reason) => {
            error!(reason = %reason, "directory connection closed during search");
            Err(Error::SocketClosed(reason))
        }
    }
}
