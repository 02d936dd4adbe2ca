//! Identifier generation utilities shared by the auth, transport and
//! server crates.

use rand::Rng;
use uuid::Uuid;

/// Session ids, handed out by `SessionTable::bind_or_create` and echoed in
/// `Mcp-Session-Id`.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Correlation ids for server-initiated sampling requests, unique within a
/// session's lifetime.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// A 32-byte random identifier, hex-encoded, as required for
/// `OAuthStateStore` keys (pending-authorization storage keys, upstream
/// state nonces, authorization codes, refresh-token ids).
pub fn generate_storage_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_64_hex_chars() {
        let key = generate_storage_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn storage_keys_are_unique() {
        assert_ne!(generate_storage_key(), generate_storage_key());
    }

    #[test]
    fn session_ids_are_uuids() {
        let id = generate_session_id();
        assert_eq!(id.len(), 36);
        assert!(id.contains('-'));
    }
}
