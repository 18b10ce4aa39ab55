//! Search filters
//!
//! Filters are built as values and rendered to the RFC 4515 string form only
//! when a request goes out, so user input is always escaped.

use ldap3::ldap_escape;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Equals { attribute: String, value: String },
    Present { attribute: String },
}

impl Filter {
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Matches every entry
    pub fn any() -> Self {
        Filter::present("objectClass")
    }

    /// OR of `attribute=value` for every value
    pub fn any_of<I, S>(attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Or(
            values
                .into_iter()
                .map(|v| Filter::eq(attribute, v))
                .collect(),
        )
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", attribute, ldap_escape(value.as_str()))
            }
            Filter::Present { attribute } => write!(f, "({}=*)", attribute),
        }
    }
}
