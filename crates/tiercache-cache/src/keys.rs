//! Cache key generation utilities.
//!
//! Provides consistent key namespacing (prefix plus optional tenant segment),
//! the location of tag records, and stable hashing for derived keys.
//!
//! Tag records live under `<namespace>~tag:<name>`. A caller key starting with
//! `~` is stored with the marker doubled, so no caller key can land on a tag
//! record.

use sha2::{Digest, Sha256};

use crate::entry::KeyScope;

/// Leading character reserved for records the cache keeps for itself.
const RESERVED_MARKER: char = '~';

/// Builds the stored key for `key` under `prefix`, adding a `tenant:<id>:`
/// segment when the scope names a tenant.
///
/// Tenant isolation is a naming convention only.
///
/// # Example
///
/// ```ignore
/// let key = namespaced("cache:", &KeyScope::tenant("acme"), "user:42:profile");
/// // Returns "cache:tenant:acme:user:42:profile"
/// ```
pub fn namespaced(prefix: &str, scope: &KeyScope, key: &str) -> String {
    let prefix = scope.key_prefix.as_deref().unwrap_or(prefix);
    match scope.tenant_id.as_deref() {
        Some(tenant) => format!("{prefix}tenant:{tenant}:{key}"),
        None if key.starts_with(RESERVED_MARKER) => format!("{prefix}{RESERVED_MARKER}{key}"),
        None => format!("{prefix}{key}"),
    }
}

/// Key under which a remote backend keeps the member set of `tag`.
pub fn tag_set_key(namespace: &str, tag: &str) -> String {
    format!("{namespace}{RESERVED_MARKER}tag:{tag}")
}

/// Hex-encoded SHA-256 of `material`. Stable across processes and builds.
pub fn stable_hash(material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix() {
        let key = namespaced("cache:", &KeyScope::default(), "user:42:profile");
        assert_eq!(key, "cache:user:42:profile");
    }

    #[test]
    fn test_tenant_segment() {
        let key = namespaced("cache:", &KeyScope::tenant("acme"), "user:42:profile");
        assert_eq!(key, "cache:tenant:acme:user:42:profile");
    }

    #[test]
    fn test_prefix_override() {
        let scope = KeyScope::tenant("acme").with_prefix("query:");
        assert_eq!(namespaced("cache:", &scope, "k"), "query:tenant:acme:k");
    }

    #[test]
    fn test_tenants_do_not_collide() {
        let a = namespaced("cache:", &KeyScope::tenant("a"), "k");
        let b = namespaced("cache:", &KeyScope::tenant("b"), "k");
        let none = namespaced("cache:", &KeyScope::default(), "k");
        assert_ne!(a, b);
        assert_ne!(a, none);
    }

    #[test]
    fn test_tag_set_key() {
        assert_eq!(tag_set_key("cache:", "user:42"), "cache:~tag:user:42");
    }

    #[test]
    fn test_caller_keys_never_reach_tag_records() {
        let record = tag_set_key("cache:", "user:42");
        for key in ["tag:user:42", "~tag:user:42", "~~tag:user:42"] {
            let stored = namespaced("cache:", &KeyScope::default(), key);
            assert_ne!(stored, record, "{key} collided with the tag record");
            assert!(stored.starts_with("cache:"));
        }
        assert_eq!(
            namespaced("cache:", &KeyScope::default(), "~tag:user:42"),
            "cache:~~tag:user:42"
        );
    }

    #[test]
    fn test_marker_escape_keeps_keys_distinct() {
        let plain = namespaced("cache:", &KeyScope::default(), "~a");
        let doubled = namespaced("cache:", &KeyScope::default(), "~~a");
        assert_ne!(plain, doubled);
    }

    #[test]
    fn test_stable_hash_consistency() {
        let first = stable_hash("GET /items?a=1");
        assert_eq!(first, stable_hash("GET /items?a=1"));
        assert_ne!(first, stable_hash("GET /items?a=2"));
        assert_eq!(first.len(), 64);
    }
}
