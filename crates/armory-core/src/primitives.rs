//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Armory engine.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Magic bytes for the Armory archive header.
///
/// - File Header = Magic Bytes ("ARMR") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"ARMR";

/// Current archive format version.
///
/// Increment this when making breaking changes to the archive layout.
pub const FORMAT_VERSION: u8 = 1;

/// Field name holding a record's id inside a raw record.
pub const ID_FIELD: &str = "id";

/// Field of an installed gear row naming the source record it came from.
pub const ORIGIN_FIELD: &str = "origin";

/// Separator between type tag and id in heterogeneous packed references
/// (`"weapon:assault_rifle"`).
pub const ANY_REF_SEPARATOR: char = ':';

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a record id.
///
/// Authored ids longer than this are rejected by `create_live` and unpack.
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum number of tokens resolved by a single `resolve_many` call.
///
/// Longer lists are resolved in chunks of this size so a single oversized
/// record cannot put thousands of store fetches in flight at once.
pub const MAX_RESOLVE_BATCH: usize = 64;

/// Maximum nesting depth walked when copying referenced records between
/// registries during import.
pub const MAX_IMPORT_DEPTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"ARMR");
    }
}
