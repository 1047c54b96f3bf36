//! Translation of lookup intents into directory queries.

use crate::{
    config::{DirectoryEndpointConfig, SchemaAttributes},
    dn::RelativeDistinguishedName,
    filter::Filter,
    Result,
};
use adlookup_core::Error;

/// Maximum number of identifiers accepted by a single user-info lookup.
pub const MAX_USER_INFO_IDENTIFIERS: usize = 50;

/// Attribute selector asking the server to return no attributes (RFC 4511).
pub const NO_ATTRIBUTES: &str = "1.1";

/// What a caller wants to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchIntent {
    /// Members of a role group, or whether one account is among them.
    RoleMembers {
        /// Common name of the role group.
        role_group: String,
        /// When set, only the presence of this account is checked.
        user_id: Option<String>,
    },
    /// Details for a list of accounts.
    UserInfo {
        /// Account identifiers.
        identifiers: Vec<String>,
    },
    /// Group names a single account belongs to.
    UserGroups {
        /// Account identifier.
        identifier: String,
    },
}

impl SearchIntent {
    /// Name used for logging and gate diagnostics.
    #[must_use]
    pub const fn operation_name(&self) -> &'static str {
        match self {
            Self::RoleMembers { .. } => "getUsersInRole",
            Self::UserInfo { .. } => "getUserInfo",
            Self::UserGroups { .. } => "getUserGroups",
        }
    }
}

/// A translated query: filter plus requested attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    /// Search filter.
    pub filter: Filter,
    /// Attributes to request.
    pub attributes: Vec<String>,
}

/// Translates an intent into a filter and attribute list.
///
/// Pure and deterministic; no network activity happens here, so validation failures are
/// reported before a session is ever opened.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] for an empty role or identifier, or for more than
/// [`MAX_USER_INFO_IDENTIFIERS`] identifiers.
pub fn build_query(intent: &SearchIntent, config: &DirectoryEndpointConfig) -> Result<DirectoryQuery> {
    let attrs = config.attributes();
    let user_class = Filter::equals("objectClass", attrs.user_class.as_str());

    match intent {
        SearchIntent::RoleMembers {
            role_group,
            user_id,
        } => {
            let role_group = require("role group", role_group)?;
            let role_dn = config
                .role_base_dn()
                .clone()
                .with_prefix(RelativeDistinguishedName::new("CN", role_group));
            let mut clauses = vec![
                user_class,
                Filter::equals(attrs.member_of.as_str(), role_dn.as_str()),
            ];

            match user_id {
                Some(user_id) => {
                    let user_id = require("user id", user_id)?;
                    clauses.push(Filter::equals(attrs.account_id.as_str(), user_id));
                    Ok(DirectoryQuery {
                        filter: Filter::And(clauses),
                        attributes: vec![NO_ATTRIBUTES.to_string()],
                    })
                }
                None => Ok(DirectoryQuery {
                    filter: Filter::And(clauses),
                    attributes: listing_attributes(attrs),
                }),
            }
        }
        SearchIntent::UserInfo { identifiers } => {
            if identifiers.len() > MAX_USER_INFO_IDENTIFIERS {
                return Err(Error::ValidationError(format!(
                    "Maximum count limit reached: {} identifiers requested, at most {MAX_USER_INFO_IDENTIFIERS} allowed",
                    identifiers.len()
                )));
            }

            let filter = if identifiers.is_empty() {
                Filter::match_none()
            } else {
                let alternatives = identifiers
                    .iter()
                    .map(|id| {
                        require("user id", id)
                            .map(|id| Filter::equals(attrs.account_id.as_str(), id))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Filter::And(vec![user_class, Filter::Or(alternatives)])
            };

            let mut attributes = listing_attributes(attrs);
            push_unique(&mut attributes, &attrs.legal_given_name);
            push_unique(&mut attributes, &attrs.legal_surname);
            Ok(DirectoryQuery { filter, attributes })
        }
        SearchIntent::UserGroups { identifier } => {
            let identifier = require("user id", identifier)?;
            Ok(DirectoryQuery {
                filter: Filter::And(vec![
                    user_class,
                    Filter::equals(attrs.account_id.as_str(), identifier),
                ]),
                attributes: listing_attributes(attrs),
            })
        }
    }
}

fn require<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::ValidationError(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}

fn listing_attributes(attrs: &SchemaAttributes) -> Vec<String> {
    let mut attributes = Vec::with_capacity(7);
    for name in [
        &attrs.display_name,
        &attrs.member_of,
        &attrs.first_name,
        &attrs.last_name,
        &attrs.mail,
    ] {
        push_unique(&mut attributes, name);
    }
    attributes
}

fn push_unique(attributes: &mut Vec<String>, name: &str) {
    if !attributes.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
        attributes.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DistinguishedName;
    use adlookup_core::credentials::BindCredentials;

    fn config() -> DirectoryEndpointConfig {
        DirectoryEndpointConfig::new(
            BindCredentials::new("svc", "secret"),
            DistinguishedName::parse("DC=2nd level,DC=1st level").unwrap(),
        )
    }

    fn role(role_group: &str, user_id: Option<&str>) -> SearchIntent {
        SearchIntent::RoleMembers {
            role_group: role_group.to_string(),
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn role_members_listing() {
        let query = build_query(&role("Admins", None), &config()).unwrap();
        assert_eq!(
            query.filter.to_string(),
            "(&(objectClass=user)(memberOf=CN=Admins,cn=read-only-admin,dc=example,dc=com))"
        );
        assert_eq!(
            query.attributes,
            vec!["cn", "memberOf", "firstname", "lastname", "mail"]
        );
    }

    #[test]
    fn role_members_presence() {
        let query = build_query(&role("Admins", Some("jdoe")), &config()).unwrap();
        assert_eq!(
            query.filter.to_string(),
            "(&(objectClass=user)(memberOf=CN=Admins,cn=read-only-admin,dc=example,dc=com)(sAMAccountName=jdoe))"
        );
        assert_eq!(query.attributes, vec![NO_ATTRIBUTES]);
    }

    #[test]
    fn role_name_cannot_widen_filter() {
        let query = build_query(&role("*)(cn=*", None), &config()).unwrap();
        let rendered = query.filter.to_string();
        assert_eq!(
            rendered,
            "(&(objectClass=user)(memberOf=CN=\\2a\\29\\28cn\\5c=\\2a,cn=read-only-admin,dc=example,dc=com))"
        );
    }

    #[test]
    fn user_info_filter() {
        let intent = SearchIntent::UserInfo {
            identifiers: vec!["a".to_string(), "b".to_string()],
        };
        let query = build_query(&intent, &config()).unwrap();
        assert_eq!(
            query.filter.to_string(),
            "(&(objectClass=user)(|(sAMAccountName=a)(sAMAccountName=b)))"
        );
        assert!(query.attributes.contains(&"givenName".to_string()));
        assert!(query.attributes.contains(&"sn".to_string()));
    }

    #[test]
    fn user_info_limit() {
        let ids = |n: usize| SearchIntent::UserInfo {
            identifiers: (0..n).map(|i| format!("user{i}")).collect(),
        };
        assert!(build_query(&ids(MAX_USER_INFO_IDENTIFIERS), &config()).is_ok());
        assert!(matches!(
            build_query(&ids(MAX_USER_INFO_IDENTIFIERS + 1), &config()),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn empty_identifier_list_matches_nothing() {
        let intent = SearchIntent::UserInfo {
            identifiers: Vec::new(),
        };
        let query = build_query(&intent, &config()).unwrap();
        assert_eq!(query.filter.to_string(), "(!(objectClass=*))");
    }

    #[test]
    fn user_groups_filter() {
        let intent = SearchIntent::UserGroups {
            identifier: "jdoe".to_string(),
        };
        let query = build_query(&intent, &config()).unwrap();
        assert_eq!(
            query.filter.to_string(),
            "(&(objectClass=user)(sAMAccountName=jdoe))"
        );
        assert!(query.attributes.contains(&"memberOf".to_string()));
    }

    #[test]
    fn blank_inputs_are_rejected() {
        assert!(matches!(
            build_query(&role("  ", None), &config()),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            build_query(&role("Admins", Some("")), &config()),
            Err(Error::ValidationError(_))
        ));
        let intent = SearchIntent::UserGroups {
            identifier: String::new(),
        };
        assert!(matches!(
            build_query(&intent, &config()),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn translation_is_deterministic() {
        let intent = role("Admins", None);
        assert_eq!(
            build_query(&intent, &config()).unwrap(),
            build_query(&intent, &config()).unwrap()
        );
    }
}
