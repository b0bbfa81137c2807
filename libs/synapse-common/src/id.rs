use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = synapse_common::id::prefixed_ulid("tmp");
/// assert!(id.starts_with("tmp_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes minted on the client.
///
/// Everything else (users, posts, comments, notifications) is identified by
/// server-issued IDs; the client only mints IDs for records that exist
/// before the server has seen them.
pub mod prefix {
    /// Pending comment awaiting server confirmation.
    pub const PENDING: &str = "tmp";
    /// Transient user-visible notice.
    pub const NOTICE: &str = "ntc";
    /// Request correlation ID for traced API calls.
    pub const REQUEST: &str = "req";
}
