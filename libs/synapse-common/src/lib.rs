pub mod id;

pub use id::{prefixed_ulid, PrefixedId};
