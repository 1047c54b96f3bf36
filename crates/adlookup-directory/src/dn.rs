//! Distinguished Name utilities for directory entries.

use adlookup_core::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for Error {
    fn from(err: DistinguishedNameError) -> Self {
        Error::ConfigError(err.to_string())
    }
}

/// Relative distinguished name (single attribute/value pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new relative distinguished name.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `CN`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value portion of the RDN.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if this RDN matches the provided attribute name (case-insensitive).
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps a canonical string form next to the parsed components. Values are unescaped in the
/// components and re-escaped in the string form, so a name assembled from caller input can be
/// embedded in a filter without changing its structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_escaped(raw, ',')? {
            let mut rdn_components = Vec::new();
            for part in split_escaped(&component, '+')? {
                let (attribute, value) = split_attribute_value(&part)?;
                rdn_components.push(RelativeDistinguishedName::new(attribute, value));
            }
            rdns.push(rdn_components);
        }

        Ok(Self {
            raw: rdns_to_string(&rdns),
            rdns,
        })
    }

    /// Builds a distinguished name from single-valued RDNs, most specific first.
    #[must_use]
    pub fn from_rdns(rdns: impl IntoIterator<Item = RelativeDistinguishedName>) -> Self {
        let rdns: Vec<_> = rdns.into_iter().map(|rdn| vec![rdn]).collect();
        Self {
            raw: rdns_to_string(&rdns),
            rdns,
        }
    }

    /// Borrows the canonical distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns an iterator over all relative distinguished names in order.
    pub fn components(&self) -> impl Iterator<Item = &RelativeDistinguishedName> + '_ {
        self.rdns.iter().flat_map(|rdn| rdn.iter())
    }

    /// The first (most specific) RDN.
    #[must_use]
    pub fn leading(&self) -> Option<&RelativeDistinguishedName> {
        self.rdns.first().and_then(|rdn| rdn.first())
    }

    /// Looks up the value for the first attribute that matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Creates a new distinguished name by prefixing the provided RDN.
    #[must_use]
    pub fn with_prefix(mut self, rdn: RelativeDistinguishedName) -> Self {
        self.rdns.insert(0, vec![rdn]);
        self.raw = rdns_to_string(&self.rdns);
        self
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Value of the leading RDN of a `memberOf` style DN string.
///
/// Lenient by intent: the text of the first `,`-separated component between its first and
/// second `=`, taken verbatim. Escapes are not interpreted, so `CN=Smith\, John` yields
/// `Smith\`. `None` when there is no `=` or the value is empty.
#[must_use]
pub fn leading_rdn_value(dn: &str) -> Option<&str> {
    dn.split(',')
        .next()?
        .split('=')
        .nth(1)
        .filter(|value| !value.is_empty())
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push('\\');
            current.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
            continue;
        }

        current.push(ch);
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<(String, String), DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value_part = component[idx + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }

    if value_part.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok((attribute.to_string(), unescape(value_part)?))
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let next = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        let pair = next
            .to_digit(16)
            .zip(chars.peek().and_then(|low| low.to_digit(16)));
        match pair {
            Some((high, low)) => {
                chars.next();
                // Both digits are < 16, so the byte fits.
                bytes.push(((high << 4) | low) as u8);
            }
            None => bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes()),
        }
    }

    String::from_utf8(bytes)
        .map_err(|_| DistinguishedNameError::InvalidComponent(value.to_string()))
}

/// Escapes an attribute value for use inside a DN string (RFC 4514).
#[must_use]
fn escape_dn_value(value: &str) -> String {
    let count = value.chars().count();
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let is_first = idx == 0;
        let is_last = idx + 1 == count;
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (is_first && (ch == ' ' || ch == '#'))
            || (is_last && ch == ' ');

        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn rdns_to_string(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|rdn| {
            rdn.iter()
                .map(|component| {
                    format!("{}={}", component.attribute(), escape_dn_value(component.value()))
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_group_dn() {
        let dn = DistinguishedName::parse("CN=GroupA,OU=X,DC=y").unwrap();
        assert_eq!(dn.get("cn"), Some("GroupA"));
        assert_eq!(dn.get("ou"), Some("X"));
        assert_eq!(dn.leading().map(RelativeDistinguishedName::value), Some("GroupA"));
        assert_eq!(dn.to_string(), "CN=GroupA,OU=X,DC=y");
    }

    #[test]
    fn parse_base_with_spaces() {
        let dn = DistinguishedName::parse("DC=2nd level,DC=1st level").unwrap();
        assert_eq!(dn.as_str(), "DC=2nd level,DC=1st level");
    }

    #[test]
    fn parse_dn_with_escape() {
        let dn = DistinguishedName::parse("CN=Smith\\, John,OU=People,DC=example,DC=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert!(dn.to_string().starts_with("CN=Smith\\, John,OU=People"));
    }

    #[test]
    fn escaped_plus_stays_in_value() {
        let dn = DistinguishedName::parse("CN=R\\+D,DC=example").unwrap();
        assert_eq!(dn.get("cn"), Some("R+D"));
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=John+uid=1234,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("uid"), Some("1234"));
        assert_eq!(
            dn.to_string(),
            "cn=John+uid=1234,ou=People,dc=example,dc=com"
        );
    }

    #[test]
    fn invalid_trailing_delimiter() {
        let err = DistinguishedName::parse("cn=John,").unwrap_err();
        assert!(matches!(err, DistinguishedNameError::InvalidComponent(_)));
        assert!(matches!(
            DistinguishedName::parse("  "),
            Err(DistinguishedNameError::Empty)
        ));
    }

    #[test]
    fn prefix_escapes_caller_value() {
        let base = DistinguishedName::parse("cn=read-only-admin,dc=example,dc=com").unwrap();
        let role = base.with_prefix(RelativeDistinguishedName::new("CN", "Ops, EMEA"));
        assert_eq!(
            role.as_str(),
            "CN=Ops\\, EMEA,cn=read-only-admin,dc=example,dc=com"
        );
    }

    #[test]
    fn from_rdns_builds_canonical_form() {
        let dn = DistinguishedName::from_rdns([
            RelativeDistinguishedName::new("cn", "read-only-admin"),
            RelativeDistinguishedName::new("dc", "example"),
        ]);
        assert_eq!(dn.as_str(), "cn=read-only-admin,dc=example");
    }

    #[test]
    fn leading_value_of_member_of() {
        assert_eq!(leading_rdn_value("CN=GroupA,OU=X,DC=y"), Some("GroupA"));
        assert_eq!(leading_rdn_value("CN=GroupB,,DC=y"), Some("GroupB"));
    }

    #[test]
    fn leading_value_takes_second_token_verbatim() {
        assert_eq!(leading_rdn_value("CN=a=b,OU=X,DC=y"), Some("a"));
        assert_eq!(leading_rdn_value("CN= GroupA ,OU=X"), Some(" GroupA "));
        assert_eq!(leading_rdn_value("CN=Smith\\, John,OU=X"), Some("Smith\\"));
        assert_eq!(
            leading_rdn_value("CN=Caf\\C3\\A9,OU=X,DC=y"),
            Some("Caf\\C3\\A9")
        );
    }

    #[test]
    fn leading_value_malformed() {
        assert_eq!(leading_rdn_value("GroupC"), None);
        assert_eq!(leading_rdn_value("CN=,OU=X"), None);
        assert_eq!(leading_rdn_value(""), None);
    }

    #[test]
    fn parse_decodes_hex_escapes() {
        let dn = DistinguishedName::parse("CN=Caf\\C3\\A9,OU=X,DC=y").unwrap();
        assert_eq!(dn.get("cn"), Some("Café"));
        let dn = DistinguishedName::parse("CN=a\\2cb,OU=X").unwrap();
        assert_eq!(dn.get("cn"), Some("a,b"));
        assert_eq!(dn.as_str(), "CN=a\\,b,OU=X");
    }

    #[test]
    fn parse_rejects_invalid_utf8_escape() {
        assert!(matches!(
            DistinguishedName::parse("CN=\\C3,OU=X"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
    }

    #[test]
    fn escape_edges() {
        assert_eq!(escape_dn_value(" lead"), "\\ lead");
        assert_eq!(escape_dn_value("#tag"), "\\#tag");
        assert_eq!(escape_dn_value("trail "), "trail\\ ");
        assert_eq!(escape_dn_value("a=b;c"), "a\\=b\\;c");
        assert_eq!(escape_dn_value(""), "");
    }
}
