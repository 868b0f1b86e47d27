//! Session state and auth endpoints for the API client
//!
//! Holds everything about *who* is calling: the canonical bearer credential,
//! the durable session store, and the login / register / refresh endpoint
//! calls. This crate has no knowledge of request retry or refresh
//! coordination; `auth-client` builds those on top of it.
//!
//! Session flow:
//! 1. `SessionStore::load()` rehydrates the persisted record at start
//! 2. `token::login()` returns user + credential → `SessionStore::set_session()`
//! 3. A refresh returns a new credential → `SessionStore::replace_credential_if()`
//! 4. Logout or a failed refresh → `SessionStore::clear()`

pub mod constants;
pub mod credential;
pub mod error;
pub mod session;
pub mod storage;
pub mod store;
pub mod token;

pub use constants::*;
pub use credential::{Credential, sanitize};
pub use error::{Error, Result};
pub use session::{Identity, Session};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::SessionStore;
pub use token::{AuthResponse, LoginRequest, RefreshResponse, login, refresh_token, register};
