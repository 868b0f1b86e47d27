//! Session store
//!
//! Owns the one `Session` of the process. The current snapshot sits in a
//! `tokio::sync::watch` channel, so reads are a cheap clone that never waits on
//! I/O and subscribers see every change. A tokio Mutex serializes mutations so
//! the record on disk is always written in the same order as the in-memory
//! updates.
//!
//! Persistence is best-effort: a failed write is logged and the in-memory
//! mutation stands. The persisted envelope is
//! `{"state":{"user":..,"token":..,"isAuthenticated":..},"version":0}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::constants::{STORAGE_KEY, STORAGE_VERSION};
use crate::credential::{Credential, sanitize};
use crate::session::{Identity, Session};
use crate::storage::{KeyValueStore, MemoryStore};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    state: PersistedState,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    user: Option<Identity>,
    token: Option<String>,
    #[serde(default)]
    is_authenticated: bool,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            state: PersistedState {
                user: session.identity().cloned(),
                token: session.credential().map(|c| c.as_str().to_string()),
                is_authenticated: session.is_authenticated(),
            },
            version: STORAGE_VERSION,
        }
    }
}

/// Process-wide session state with durable persistence.
///
/// Share it as `Arc<SessionStore>`; every component reads and mutates the
/// same instance, so no copy can drift.
pub struct SessionStore {
    state: watch::Sender<Session>,
    storage: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Rehydrate from `storage[key]`.
    ///
    /// A missing record is a cold start. An unreadable, corrupt or
    /// wrong-version record is logged and ignored; the session starts empty.
    pub async fn load(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let session = match storage.get_item(&key).await {
            Ok(Some(raw)) => match parse_record(&raw) {
                Some(session) => {
                    info!(
                        key = %key,
                        authenticated = session.is_authenticated(),
                        "rehydrated session"
                    );
                    session
                }
                None => Session::empty(),
            },
            Ok(None) => {
                info!(key = %key, "no persisted session, starting logged out");
                Session::empty()
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read persisted session, starting logged out");
                Session::empty()
            }
        };

        Self {
            state: watch::Sender::new(session),
            storage,
            key,
            write_lock: Mutex::new(()),
        }
    }

    /// Empty store backed by memory only, under the default key.
    pub fn in_memory() -> Self {
        Self {
            state: watch::Sender::new(Session::empty()),
            storage: Arc::new(MemoryStore::new()),
            key: STORAGE_KEY.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Current credential, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.state.borrow().credential().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every subsequent mutation.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Replace identity and credential after a login or registration.
    pub async fn set_session(&self, identity: Identity, raw_credential: &str) {
        let credential = sanitize(raw_credential);
        if credential.is_none() {
            warn!("set_session received an empty credential");
        }
        let _guard = self.write_lock.lock().await;
        self.state
            .send_modify(|session| session.replace(Some(identity), credential));
        info!("session established");
        self.persist().await;
    }

    /// Replace only the credential (after a refresh).
    pub async fn set_credential(&self, raw_credential: &str) {
        let credential = sanitize(raw_credential);
        let _guard = self.write_lock.lock().await;
        self.state
            .send_modify(|session| session.set_credential(credential));
        debug!("credential replaced");
        self.persist().await;
    }

    /// Replace the credential only if the store still holds `expected`.
    ///
    /// Returns false and writes nothing when the session moved on in the
    /// meantime (cleared by a logout, or replaced by a new login).
    pub async fn replace_credential_if(
        &self,
        expected: Option<&Credential>,
        raw_credential: &str,
    ) -> bool {
        let credential = sanitize(raw_credential);
        let _guard = self.write_lock.lock().await;
        let mut replaced = false;
        self.state.send_if_modified(|session| {
            if session.credential() != expected {
                return false;
            }
            session.set_credential(credential);
            replaced = true;
            true
        });
        if !replaced {
            debug!("session changed since refresh began, credential not stored");
            return false;
        }
        debug!("credential replaced");
        self.persist().await;
        true
    }

    /// Merge fields into the current identity; the credential is untouched.
    pub async fn update_identity(&self, partial: Identity) {
        let _guard = self.write_lock.lock().await;
        self.state
            .send_modify(|session| session.merge_identity(partial));
        debug!("identity updated");
        self.persist().await;
    }

    /// Reset to the logged-out session and remove the persisted record.
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        self.state.send_replace(Session::empty());
        info!("session cleared");
        if let Err(e) = self.storage.remove_item(&self.key).await {
            warn!(key = %self.key, error = %e, "failed to remove persisted session");
        }
    }

    /// Clear only if the store still holds `expected`. Returns whether it did.
    pub async fn clear_if(&self, expected: Option<&Credential>) -> bool {
        let _guard = self.write_lock.lock().await;
        if self.state.borrow().credential() != expected {
            debug!("session changed since refresh began, not clearing");
            return false;
        }
        self.state.send_replace(Session::empty());
        info!("session cleared");
        if let Err(e) = self.storage.remove_item(&self.key).await {
            warn!(key = %self.key, error = %e, "failed to remove persisted session");
        }
        true
    }

    /// Write the current snapshot. Caller holds `write_lock`.
    async fn persist(&self) {
        let record = PersistedSession::from(&*self.state.borrow());
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize session");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(&self.key, json).await {
            warn!(key = %self.key, error = %e, "failed to persist session");
        }
    }
}

fn parse_record(raw: &str) -> Option<Session> {
    let record: PersistedSession = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "persisted session is corrupt, ignoring");
            return None;
        }
    };
    if record.version != STORAGE_VERSION {
        warn!(
            version = record.version,
            expected = STORAGE_VERSION,
            "persisted session has unknown version, ignoring"
        );
        return None;
    }
    let credential = record.state.token.as_deref().and_then(sanitize);
    Some(Session::new(record.state.user, credential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::storage::{FileStore, StorageFuture};
    use serde_json::json;

    fn user(value: serde_json::Value) -> Identity {
        Identity::from_value(value).unwrap()
    }

    /// Storage whose writes and removals always fail.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get_item<'a>(&'a self, _key: &'a str) -> StorageFuture<'a, Option<String>> {
            Box::pin(async { Err(Error::Io("disk unavailable".into())) })
        }

        fn set_item<'a>(&'a self, _key: &'a str, _value: String) -> StorageFuture<'a, ()> {
            Box::pin(async { Err(Error::Io("disk full".into())) })
        }

        fn remove_item<'a>(&'a self, _key: &'a str) -> StorageFuture<'a, ()> {
            Box::pin(async { Result::<()>::Err(Error::Io("read-only".into())) })
        }
    }

    #[tokio::test]
    async fn set_session_sanitizes_and_authenticates() {
        let store = SessionStore::in_memory();
        store
            .set_session(user(json!({"id": 1, "role": "admin"})), "Bearer abc")
            .await;

        let session = store.get();
        assert!(session.is_authenticated());
        assert_eq!(session.credential().unwrap().as_str(), "abc");
        assert_eq!(session.identity().unwrap().get_str("role"), Some("admin"));
    }

    #[tokio::test]
    async fn set_credential_stores_canonical_value() {
        let store = SessionStore::in_memory();
        store.set_session(user(json!({"id": 1})), "old").await;
        store.set_credential("Bearer xyz").await;

        assert_eq!(store.credential().unwrap().as_str(), "xyz");
        assert_eq!(store.credential().unwrap().header_value(), "Bearer xyz");
        assert_eq!(store.get().identity().unwrap().get("id"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn update_identity_leaves_credential() {
        let store = SessionStore::in_memory();
        store
            .set_session(user(json!({"id": 1, "name": "Budi"})), "abc")
            .await;
        store.update_identity(user(json!({"name": "Budi S."}))).await;

        let session = store.get();
        assert_eq!(session.identity().unwrap().get_str("name"), Some("Budi S."));
        assert_eq!(session.credential().unwrap().as_str(), "abc");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn clear_resets_and_removes_record() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store.set_session(user(json!({"id": 1})), "abc").await;
        assert_eq!(storage.len().await, 1);

        store.clear().await;
        let session = store.get();
        assert!(!session.is_authenticated());
        assert!(session.credential().is_none());
        assert!(session.identity().is_none());
        assert!(storage.is_empty().await, "persisted record must be removed");
    }

    #[tokio::test]
    async fn conditional_replace_skips_cleared_session() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store.set_session(user(json!({"id": 1})), "old").await;
        let expected = store.credential();

        store.clear().await;
        assert!(!store.replace_credential_if(expected.as_ref(), "abc").await);
        assert!(store.credential().is_none());
        assert!(storage.is_empty().await, "cleared record must stay removed");
    }

    #[tokio::test]
    async fn conditional_replace_keeps_newer_login() {
        let store = SessionStore::in_memory();
        store.set_session(user(json!({"id": 1})), "old").await;
        let expected = store.credential();

        store.set_session(user(json!({"id": 2})), "fresh-login").await;
        assert!(!store.replace_credential_if(expected.as_ref(), "abc").await);
        assert_eq!(store.credential().unwrap().as_str(), "fresh-login");
    }

    #[tokio::test]
    async fn conditional_clear_spares_newer_login() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store.set_session(user(json!({"id": 1})), "old").await;
        let expected = store.credential();

        store.set_session(user(json!({"id": 2})), "fresh-login").await;
        assert!(!store.clear_if(expected.as_ref()).await);
        assert!(store.is_authenticated());
        assert_eq!(storage.len().await, 1);

        let current = store.credential();
        assert!(store.clear_if(current.as_ref()).await);
        assert!(!store.is_authenticated());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn conditional_replace_writes_when_unchanged() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store.set_session(user(json!({"id": 1})), "old").await;
        let expected = store.credential();

        assert!(store.replace_credential_if(expected.as_ref(), "Bearer abc").await);
        assert_eq!(store.credential().unwrap().as_str(), "abc");
        let raw = storage.get_item(STORAGE_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"token\":\"abc\""), "got: {raw}");
    }

    #[tokio::test]
    async fn persisted_record_uses_envelope_format() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store
            .set_session(user(json!({"id": 3, "email": "a@b.c"})), "Bearer tok")
            .await;

        let raw = storage.get_item(STORAGE_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 0);
        assert_eq!(value["state"]["token"], "tok");
        assert_eq!(value["state"]["isAuthenticated"], true);
        assert_eq!(value["state"]["user"]["email"], "a@b.c");
    }

    #[tokio::test]
    async fn restart_rehydrates_same_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());

        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        store.set_session(user(json!({"id": 9})), "abc").await;
        store.set_credential("def").await;
        drop(store);

        let reloaded = SessionStore::load(storage, STORAGE_KEY).await;
        let session = reloaded.get();
        assert!(session.is_authenticated());
        assert_eq!(session.credential().unwrap().as_str(), "def");
        assert_eq!(session.identity().unwrap().get("id"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn rehydrate_sanitizes_legacy_prefixed_token() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set_item(
                STORAGE_KEY,
                r#"{"state":{"user":{"id":1},"token":"Bearer Bearer q","isAuthenticated":true},"version":0}"#
                    .into(),
            )
            .await
            .unwrap();

        let store = SessionStore::load(storage, STORAGE_KEY).await;
        assert_eq!(store.credential().unwrap().as_str(), "q");
    }

    #[tokio::test]
    async fn rehydrate_recomputes_authenticated_flag() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set_item(
                STORAGE_KEY,
                r#"{"state":{"user":null,"token":"abc","isAuthenticated":true},"version":0}"#.into(),
            )
            .await
            .unwrap();

        let store = SessionStore::load(storage, STORAGE_KEY).await;
        assert!(
            !store.is_authenticated(),
            "a record without a user cannot be authenticated"
        );
        assert_eq!(store.credential().unwrap().as_str(), "abc");
    }

    #[tokio::test]
    async fn corrupt_or_unknown_version_record_starts_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set_item(STORAGE_KEY, "not json {{".into())
            .await
            .unwrap();
        let store = SessionStore::load(storage.clone(), STORAGE_KEY).await;
        assert_eq!(store.get(), Session::empty());

        storage
            .set_item(
                STORAGE_KEY,
                r#"{"state":{"user":{"id":1},"token":"abc","isAuthenticated":true},"version":7}"#
                    .into(),
            )
            .await
            .unwrap();
        let store = SessionStore::load(storage, STORAGE_KEY).await;
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn storage_failures_do_not_block_mutations() {
        let store = SessionStore::load(Arc::new(BrokenStore), STORAGE_KEY).await;
        assert_eq!(store.get(), Session::empty());

        store.set_session(user(json!({"id": 1})), "abc").await;
        assert!(store.is_authenticated());

        store.clear().await;
        assert!(!store.is_authenticated());
        assert!(store.credential().is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_clear() {
        let store = SessionStore::in_memory();
        store.set_session(user(json!({"id": 1})), "abc").await;

        let mut rx = store.subscribe();
        store.clear().await;
        rx.changed().await.unwrap();
        assert!(!rx.borrow().is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_mutations_persist_last_snapshot() {
        let storage = Arc::new(MemoryStore::new());
        let store = Arc::new(SessionStore::load(storage.clone(), STORAGE_KEY).await);
        store.set_session(user(json!({"id": 1})), "t0").await;

        let mut handles = vec![];
        for i in 1..=10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_credential(&format!("t{i}")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let raw = storage.get_item(STORAGE_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value["state"]["token"].as_str(),
            store.credential().as_ref().map(Credential::as_str),
            "persisted record must match the in-memory credential"
        );
    }
}
