//! Bearer credential and its canonical form
//!
//! Login and refresh endpoints are not consistent about whether the token they
//! return already carries the `Bearer` scheme. Every value written into the
//! session store goes through `sanitize` so the stored credential is always the
//! bare token and the header is never double-prefixed.

use std::fmt;

use crate::constants::BEARER_SCHEME;

/// A bare bearer token in canonical form (no scheme prefix, no surrounding
/// whitespace, never empty). Only `sanitize` constructs one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// The bare token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Bearer <token>`, ready for an `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{BEARER_SCHEME} {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

/// Normalize a raw credential.
///
/// Strips every leading `Bearer ` prefix (case-insensitive, any whitespace
/// after the scheme) and trims the result. Empty input, or input that is only
/// the scheme, yields `None`. Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> Option<Credential> {
    let mut token = raw.trim();
    while let Some(rest) = strip_scheme(token) {
        token = rest.trim_start();
    }
    if token.is_empty() || token.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    Some(Credential(token.to_string()))
}

fn strip_scheme(value: &str) -> Option<&str> {
    let (head, rest) = value.split_at_checked(BEARER_SCHEME.len())?;
    if head.eq_ignore_ascii_case(BEARER_SCHEME) && rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}
