//! Email address syntax parsing.
//!
//! This is the syntax stage of verification: does the address even
//! look like an email address, and if so, what's its local part and
//! domain. Deliverability is decided downstream, not here.

use thiserror::Error;

use crate::Domain;

/// An email address split into its syntactic parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    pub username: String,
    pub domain: Domain,
}

impl ParsedEmail {
    /// Parse a single address, rejecting group addresses and anything
    /// that isn't exactly one mailbox.
    pub fn parse(input: &str) -> Result<Self, EmailSyntaxError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EmailSyntaxError::Empty);
        }

        let addrs = mailparse::addrparse(input).map_err(|_| EmailSyntaxError::Malformed)?;
        if addrs.len() != 1 {
            return Err(EmailSyntaxError::Malformed);
        }

        let mailparse::MailAddr::Single(single) = &addrs[0] else {
            return Err(EmailSyntaxError::GroupAddress);
        };

        let (username, domain) = single
            .addr
            .rsplit_once('@')
            .ok_or(EmailSyntaxError::Malformed)?;

        if username.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(EmailSyntaxError::Malformed);
        }

        Ok(Self {
            username: username.to_string(),
            domain: Domain::new(domain),
        })
    }

    #[must_use]
    pub fn to_address(&self) -> String {
        format!("{}@{}", self.username, self.domain)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EmailSyntaxError {
    #[error("address is empty")]
    Empty,
    #[error("address does not parse as a single RFC 5322 mailbox")]
    Malformed,
    #[error("address refers to a group, not a mailbox")]
    GroupAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_address() {
        let parsed = ParsedEmail::parse("user@example.com").unwrap();
        assert_eq!(parsed.username, "user");
        assert_eq!(parsed.domain.as_str(), "example.com");
    }

    #[test]
    fn test_parse_lowercases_domain() {
        let parsed = ParsedEmail::parse("User@Example.COM").unwrap();
        assert_eq!(parsed.domain.as_str(), "example.com");
        assert_eq!(parsed.username, "User");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ParsedEmail::parse("").unwrap_err(), EmailSyntaxError::Empty);
        assert_eq!(
            ParsedEmail::parse("   ").unwrap_err(),
            EmailSyntaxError::Empty
        );
    }

    #[test]
    fn test_parse_rejects_no_domain_dot() {
        assert_eq!(
            ParsedEmail::parse("user@localhost").unwrap_err(),
            EmailSyntaxError::Malformed
        );
    }

    #[test]
    fn test_parse_rejects_multiple_addresses() {
        assert_eq!(
            ParsedEmail::parse("a@example.com, b@example.com").unwrap_err(),
            EmailSyntaxError::Malformed
        );
    }

    #[test]
    fn test_parse_rejects_group() {
        assert_eq!(
            ParsedEmail::parse("undisclosed-recipients:;").unwrap_err(),
            EmailSyntaxError::Malformed
        );
    }

    #[test]
    fn test_to_address_roundtrip() {
        let parsed = ParsedEmail::parse("user@example.com").unwrap();
        assert_eq!(parsed.to_address(), "user@example.com");
    }
}
