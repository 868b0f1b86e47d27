//! Session snapshot and identity
//!
//! `Session` is a value type: the store hands out clones, so readers never hold
//! a lock and never see a half-applied mutation. The `authenticated` flag is
//! derived from the other two fields on every construction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credential::Credential;

/// The signed-in user as returned by the API (`id`, `name`, `email`, `role`, ...).
///
/// Kept as an open JSON object: the core never interprets user fields, it only
/// stores them and merges partial updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Map<String, Value>);

impl Identity {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build from any JSON value; non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Convenience for string fields such as `email` or `role`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow merge: top-level fields in `partial` overwrite existing ones.
    pub fn merge(&mut self, partial: Identity) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }
}

/// Current authentication state.
///
/// Invariant: `authenticated` is true iff both `identity` and `credential`
/// are present. Fields are private so the invariant cannot be broken from
/// outside; use the store to change a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    identity: Option<Identity>,
    credential: Option<Credential>,
    authenticated: bool,
}

impl Session {
    pub(crate) fn new(identity: Option<Identity>, credential: Option<Credential>) -> Self {
        let authenticated = identity.is_some() && credential.is_some();
        Self {
            identity,
            credential,
            authenticated,
        }
    }

    /// The logged-out session.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn replace(&mut self, identity: Option<Identity>, credential: Option<Credential>) {
        *self = Self::new(identity, credential);
    }

    pub(crate) fn set_credential(&mut self, credential: Option<Credential>) {
        let identity = self.identity.take();
        self.replace(identity, credential);
    }

    pub(crate) fn merge_identity(&mut self, partial: Identity) {
        let mut identity = self.identity.take().unwrap_or_default();
        identity.merge(partial);
        let credential = self.credential.take();
        self.replace(Some(identity), credential);
    }
}
