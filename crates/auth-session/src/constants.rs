//! Endpoint paths and persistence names
//!
//! Paths are relative to the API base URL. They match the backend's auth
//! routes; deployments with different routes override them through the client
//! options rather than editing these values.

/// Authorization scheme prepended to every stored credential on the wire.
pub const BEARER_SCHEME: &str = "Bearer";

/// Credential refresh endpoint. A 401 from this path never triggers a refresh.
pub const REFRESH_PATH: &str = "/auth/refresh-token";

/// Email/password login endpoint.
pub const LOGIN_PATH: &str = "/auth/login";

/// Account registration endpoint.
pub const REGISTER_PATH: &str = "/auth/register";

/// Key of the persisted session record in the key-value store.
pub const STORAGE_KEY: &str = "auth-storage";

/// Version tag written into the persisted session envelope.
pub const STORAGE_VERSION: u32 = 0;
