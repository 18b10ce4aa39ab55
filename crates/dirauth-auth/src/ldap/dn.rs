//! Distinguished names
//!
//! Parses the string form of a DN (an RFC 4514 subset) into RDNs:
//!
//! ```text
//! dn       = [ rdn *( "," rdn ) ]
//! rdn      = atv *( "+" atv )
//! atv      = type "=" value
//! type     = 1*( ALPHA / DIGIT / "-" / "." )
//! value    = *( escaped / plain )
//! escaped  = "\" ( special / hexpair )
//! special  = "," / "+" / DQUOTE / "\" / "<" / ">" / ";" / "=" / SP / "#"
//! ```
//!
//! Unescaped whitespace around types and values is ignored. Hex pairs
//! decode to raw bytes and the decoded value must be valid UTF-8.

use ldap3::dn_escape;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("missing '=' in RDN at offset {0}")]
    MissingEquals(usize),

    #[error("invalid attribute type '{0}'")]
    InvalidAttribute(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("attribute value is not valid UTF-8")]
    InvalidUtf8,
}

/// One `type=value` assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attribute: String,
    pub value: String,
}

/// Relative distinguished name; usually a single assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    pub avas: Vec<Ava>,
}

impl Rdn {
    /// Value of `attribute`, compared case-insensitively
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|ava| ava.attribute.eq_ignore_ascii_case(attribute))
            .map(|ava| ava.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    pub fn parse(input: &str) -> Result<Self, DnError> {
        Parser::new(input).parse()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Leftmost RDN
    pub fn first(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            for (j, ava) in rdn.avas.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{}={}", ava.attribute, dn_escape(ava.value.as_str()))?;
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Dn, DnError> {
        let mut rdns = Vec::new();
        if self.input.trim().is_empty() {
            return Ok(Dn { rdns });
        }

        loop {
            let mut avas = vec![self.ava()?];
            while self.peek() == Some(b'+') {
                self.pos += 1;
                avas.push(self.ava()?);
            }
            rdns.push(Rdn { avas });

            match self.peek() {
                Some(b',') => self.pos += 1,
                _ => break,
            }
        }

        Ok(Dn { rdns })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn ava(&mut self) -> Result<Ava, DnError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'=' => break,
                b',' | b'+' => return Err(DnError::MissingEquals(start)),
                _ => self.pos += 1,
            }
        }
        if self.peek() != Some(b'=') {
            return Err(DnError::MissingEquals(start));
        }

        let attribute = self.input[start..self.pos].trim();
        let valid = !attribute.is_empty()
            && attribute
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
        if !valid {
            return Err(DnError::InvalidAttribute(attribute.to_string()));
        }
        self.pos += 1;

        let value = self.value()?;
        Ok(Ava {
            attribute: attribute.to_string(),
            value,
        })
    }

    fn value(&mut self) -> Result<String, DnError> {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }

        let mut buf = Vec::new();
        // Length up to the last escaped or non-space byte; trailing
        // unescaped spaces are dropped.
        let mut significant = 0;

        while let Some(b) = self.peek() {
            match b {
                b',' | b'+' => break,
                b'\\' => {
                    let escape_at = self.pos;
                    self.pos += 1;
                    let first = self.peek().ok_or(DnError::InvalidEscape(escape_at))?;
                    let second = self.bytes.get(self.pos + 1).copied();

                    match (hex_value(first), second.and_then(hex_value)) {
                        (Some(hi), Some(lo)) => {
                            buf.push(hi << 4 | lo);
                            self.pos += 2;
                        }
                        _ if is_special(first) => {
                            buf.push(first);
                            self.pos += 1;
                        }
                        _ => return Err(DnError::InvalidEscape(escape_at)),
                    }
                    significant = buf.len();
                }
                _ => {
                    buf.push(b);
                    if b != b' ' {
                        significant = buf.len();
                    }
                    self.pos += 1;
                }
            }
        }

        buf.truncate(significant);
        String::from_utf8(buf).map_err(|_| DnError::InvalidUtf8)
    }
}

fn is_special(b: u8) -> bool {
    matches!(
        b,
        b',' | b'+' | b'"' | b'\\' | b'<' | b'>' | b';' | b'=' | b' ' | b'#'
    )
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Identifying value of a group member entry.
///
/// DN-valued members (`uid=alice,ou=users,...`) yield the value of the
/// leftmost RDN when its attribute is `user_attribute`; plain values
/// (`memberUid: alice`) are returned as-is.
pub fn member_identifier(member: &str, user_attribute: &str) -> Option<String> {
    let member = member.trim();
    if !member.contains('=') {
        return Some(member.to_string()).filter(|m| !m.is_empty());
    }

    Dn::parse(member)
        .ok()?
        .first()?
        .get(user_attribute)
        .map(str::to_string)
}
