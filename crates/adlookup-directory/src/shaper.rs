//! Shaping of directory entries into lookup results.

use crate::{
    config::SchemaAttributes, dn::leading_rdn_value, intent::SearchIntent,
    search::DirectoryEntry,
};
use feruca::Collator;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

/// Message returned when the account is not a member of the role.
pub const USER_NOT_FOUND: &str = "User id Not Found";
/// Message returned when the account is a member of the role.
pub const USER_PRESENT: &str = "User id is present!";

const RESERVED_KEYS: [&str; 4] = ["id", "firstName", "lastName", "email"];

/// Result of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResult {
    /// User records.
    Users(Vec<UserRecord>),
    /// Role membership check.
    Presence(PresenceStatus),
    /// Group names.
    Groups(Vec<String>),
}

/// Single- or multi-valued attribute as it appears in a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Attribute with exactly one value.
    Single(String),
    /// Attribute with several values.
    Multiple(Vec<String>),
}

impl AttributeValue {
    fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multiple(values)
        }
    }
}

/// A user as returned to callers.
///
/// Serializes flat: the raw directory attributes (and `dn`) sit next to `id` and the mapped
/// name fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    /// Display name of the user.
    pub id: String,
    /// Mapped first name.
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Mapped last name.
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Mapped mail address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Everything the directory returned.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl UserRecord {
    fn from_entry(entry: DirectoryEntry, attrs: &SchemaAttributes, map_names: bool) -> Self {
        let id = entry
            .first(&attrs.display_name)
            .unwrap_or_default()
            .to_string();
        let mapped = |attribute: &str| {
            map_names
                .then(|| entry.first(attribute).map(str::to_string))
                .flatten()
        };
        let first_name = mapped(&attrs.legal_given_name);
        let last_name = mapped(&attrs.legal_surname);
        let email = mapped(&attrs.mail);

        let mut attributes = BTreeMap::new();
        attributes.insert("dn".to_string(), AttributeValue::Single(entry.dn));
        for (name, values) in entry.attributes {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            attributes.insert(name, AttributeValue::from_values(values));
        }

        Self {
            id,
            first_name,
            last_name,
            email,
            attributes,
        }
    }
}

/// Outcome of a role membership check.
///
/// Serializes as `[{"message": "..."}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    /// No matching entry.
    NotFound,
    /// At least one matching entry.
    Present,
}

impl PresenceStatus {
    /// Human-readable message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotFound => USER_NOT_FOUND,
            Self::Present => USER_PRESENT,
        }
    }
}

#[derive(Serialize)]
struct PresenceMessage {
    message: &'static str,
}

impl Serialize for PresenceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [PresenceMessage {
            message: self.message(),
        }]
        .serialize(serializer)
    }
}

/// Shapes search entries according to the intent that produced them.
#[must_use]
pub fn shape(
    intent: &SearchIntent,
    entries: Vec<DirectoryEntry>,
    attrs: &SchemaAttributes,
) -> LookupResult {
    match intent {
        SearchIntent::RoleMembers {
            user_id: Some(_), ..
        } => LookupResult::Presence(if entries.is_empty() {
            PresenceStatus::NotFound
        } else {
            PresenceStatus::Present
        }),
        SearchIntent::RoleMembers { user_id: None, .. } => {
            let mut users: Vec<UserRecord> = entries
                .into_iter()
                .map(|entry| UserRecord::from_entry(entry, attrs, false))
                .collect();
            let mut collator = Collator::default();
            users.sort_by(|a, b| collator.collate(a.id.as_str(), b.id.as_str()));
            LookupResult::Users(users)
        }
        SearchIntent::UserInfo { .. } => LookupResult::Users(
            entries
                .into_iter()
                .map(|entry| UserRecord::from_entry(entry, attrs, true))
                .collect(),
        ),
        SearchIntent::UserGroups { .. } => {
            LookupResult::Groups(entries.first().map_or_else(Vec::new, |entry| {
                group_names(entry, attrs)
            }))
        }
    }
}

fn group_names(entry: &DirectoryEntry, attrs: &SchemaAttributes) -> Vec<String> {
    entry
        .values(&attrs.member_of)
        .unwrap_or_default()
        .iter()
        .filter_map(|dn| {
            let name = leading_rdn_value(dn);
            if name.is_none() {
                warn!(value = %dn, "skipping malformed group DN");
            }
            name.map(str::to_string)
        })
        .collect()
}

/// Locale-aware string ordering using the Unicode Collation Algorithm with the root locale.
///
/// Accents and case are secondary and tertiary differences, so `Élodie` sorts with the other
/// `E` names and `a` sorts before `A`.
#[must_use]
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    Collator::default().collate(a, b)
}
