//! Constants shared by the client and its building blocks.

/// Namespace tag that prefixes every error message surfaced by the SDK.
pub const ERROR_NAMESPACE: &str = "pubsub";

/// Origin used when the client configuration does not override it.
pub const DEFAULT_ORIGIN: &str = "ps.pndsn.com";

/// Query parameter names reserved by the execution core.
pub mod query_keys {
    /// Client identity.
    pub const UUID: &str = "uuid";
    /// SDK identifier.
    pub const SDK: &str = "pnsdk";
    /// Per-request random identifier.
    pub const REQUEST_ID: &str = "requestid";
    /// Legacy auth key or access token.
    pub const AUTH: &str = "auth";
    /// Unix timestamp (seconds) of a signed request.
    pub const TIMESTAMP: &str = "timestamp";
    /// Request signature.
    pub const SIGNATURE: &str = "signature";
}

/// Documented TTL bounds for access-manager grants, in minutes.
pub mod ttl_bounds {
    /// Smallest positive TTL accepted by the service.
    pub const MIN_MINUTES: u32 = 1;
    /// Largest TTL accepted by the service (one year).
    pub const MAX_MINUTES: u32 = 525_600;
}
