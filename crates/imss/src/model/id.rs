//! Global object identities.
//!
//! Every serializable object carries a 128-bit identity that is independent
//! of where it lives in memory. The object catalogs key on it.

use uuid::Uuid;

/// A 128-bit global identity.
pub type Guid = Uuid;

/// The nil identity, used for decoded placeholders until their definition
/// arrives.
pub const NIL_GUID: Guid = Uuid::nil();

/// Mints a fresh, time-ordered identity (UUIDv7).
pub fn new_identity() -> Guid {
    Uuid::now_v7()
}

/// Formats an identity as lowercase hyphenated hex, the text-mode form.
pub fn format_guid(id: &Guid) -> String {
    id.hyphenated().to_string()
}

/// Parses an identity from hex, with or without hyphens.
pub fn parse_guid(s: &str) -> Option<Guid> {
    Uuid::try_parse(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_roundtrip() {
        let id = new_identity();
        let formatted = format_guid(&id);
        assert_eq!(formatted.len(), 36);
        assert_eq!(parse_guid(&formatted), Some(id));
    }

    #[test]
    fn test_parse_without_hyphens() {
        let plain = parse_guid("550e8400e29b41d4a716446655440000").unwrap();
        let hyphenated = parse_guid("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(plain, hyphenated);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_guid("Name=Composition 1"), None);
        assert_eq!(parse_guid(""), None);
    }

    #[test]
    fn test_new_identities_are_distinct() {
        assert_ne!(new_identity(), new_identity());
        assert_ne!(new_identity(), NIL_GUID);
    }
}
