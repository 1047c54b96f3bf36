//! LDAP search filters (RFC 4515 string form).

use std::fmt;

/// A search filter tree.
///
/// Rendering escapes every assertion value, so values may carry arbitrary caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// Any sub-filter must match.
    Or(Vec<Filter>),
    /// The sub-filter must not match.
    Not(Box<Filter>),
    /// Equality assertion.
    Equals {
        /// Attribute name.
        attribute: String,
        /// Unescaped assertion value.
        value: String,
    },
    /// Presence assertion (`attr=*`).
    Present {
        /// Attribute name.
        attribute: String,
    },
}

impl Filter {
    /// Equality assertion helper.
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Presence assertion helper.
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present {
            attribute: attribute.into(),
        }
    }

    /// A filter no entry can satisfy.
    #[must_use]
    pub fn match_none() -> Self {
        Self::Not(Box::new(Self::present("objectClass")))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Equals { attribute, value } => {
                write!(f, "({attribute}={})", escape_filter_value(value))
            }
            Self::Present { attribute } => write!(f, "({attribute}=*)"),
        }
    }
}

/// Escapes special characters in a filter assertion value (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_filter() {
        let filter = Filter::And(vec![
            Filter::equals("objectClass", "user"),
            Filter::Or(vec![
                Filter::equals("sAMAccountName", "a"),
                Filter::equals("sAMAccountName", "b"),
            ]),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=user)(|(sAMAccountName=a)(sAMAccountName=b)))"
        );
    }

    #[test]
    fn escapes_assertion_values() {
        let filter = Filter::equals("sAMAccountName", "*)(objectClass=*");
        assert_eq!(
            filter.to_string(),
            "(sAMAccountName=\\2a\\29\\28objectClass=\\2a)"
        );
        assert_eq!(escape_filter_value("a\\b\0"), "a\\5cb\\00");
    }

    #[test]
    fn match_none_renders_negated_presence() {
        assert_eq!(Filter::match_none().to_string(), "(!(objectClass=*))");
    }
}
