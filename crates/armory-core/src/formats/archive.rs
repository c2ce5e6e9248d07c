//! # Archive Format
//!
//! Binary snapshot of every record in a registry.
//!
//! Format: Header (5 bytes) + postcard-serialized payload.
//! - 4 bytes: Magic ("ARMR")
//! - 1 byte: Version
//!
//! The payload carries one table per entry type, rows sorted by id, each row
//! the raw record as a JSON string. A checksum over the rows is stored in
//! the payload and verified on decode.
//!
//! ## Limits
//!
//! Input size is checked against `MAX_ARCHIVE_SIZE` and the header is
//! validated before the payload is parsed.

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES};
use crate::registry::Registry;
use crate::{ArmoryError, EntryType, RawRecord};
use serde::{Deserialize, Serialize};

/// Maximum accepted archive size (500 MB).
pub const MAX_ARCHIVE_SIZE: usize = 500 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

fn ser_err(e: impl std::fmt::Display) -> ArmoryError {
    ArmoryError::SerializationError(e.to_string())
}

// =============================================================================
// HEADER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), ArmoryError> {
        if &self.magic != MAGIC_BYTES {
            return Err(ser_err("Invalid archive format"));
        }
        if self.version != FORMAT_VERSION {
            return Err(ser_err(format!(
                "Unsupported archive version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArmoryError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(ser_err("Archive too short"));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRow {
    pub id: String,
    /// The raw record, JSON-encoded.
    pub record: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTable {
    pub entry_type: EntryType,
    pub rows: Vec<ArchiveRow>,
}

/// Every record of a content universe, in deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub label: String,
    pub tables: Vec<ArchiveTable>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    checksum: u64,
    archive: Archive,
}

impl Archive {
    /// Total number of rows across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// FNV-1a over every table tag, row id and record, in order.
    ///
    /// Detects accidental corruption; not a cryptographic digest.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        let mut feed = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(PRIME);
            }
            // Field separator so ("ab", "c") and ("a", "bc") differ.
            hash ^= 0xff;
            hash = hash.wrapping_mul(PRIME);
        };
        for table in &self.tables {
            feed(table.entry_type.as_str().as_bytes());
            for row in &table.rows {
                feed(row.id.as_bytes());
                feed(row.record.as_bytes());
            }
        }
        hash
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Encode an archive (header + payload).
pub fn archive_to_bytes(archive: &Archive) -> Result<Vec<u8>, ArmoryError> {
    let payload = postcard::to_stdvec(&Payload {
        checksum: archive.checksum(),
        archive: archive.clone(),
    })
    .map_err(ser_err)?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&ArchiveHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode and verify an archive.
pub fn archive_from_bytes(bytes: &[u8]) -> Result<Archive, ArmoryError> {
    if bytes.len() > MAX_ARCHIVE_SIZE {
        return Err(ser_err(format!(
            "Archive size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_ARCHIVE_SIZE
        )));
    }
    let header = ArchiveHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload: Payload = postcard::from_bytes(&bytes[HEADER_SIZE..])
        .map_err(|e| ser_err(format!("Failed to decode archive payload: {e}")))?;
    let computed = payload.archive.checksum();
    if computed != payload.checksum {
        return Err(ser_err(format!(
            "Archive checksum mismatch: stored {:016x}, computed {computed:016x}",
            payload.checksum
        )));
    }
    Ok(payload.archive)
}

/// BLAKE3 digest of encoded archive bytes, as hex.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn archive_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

// =============================================================================
// REGISTRY SNAPSHOT
// =============================================================================

/// Snapshot every stored record of a registry.
pub async fn export_registry(registry: &Registry) -> Result<Archive, ArmoryError> {
    let mut tables = Vec::new();
    for entry_type in registry.entry_types() {
        let category = registry.category(entry_type)?;
        let mut ids = category.list_ids().await?;
        ids.sort();

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(record) = category.store().get(entry_type, &id).await? else {
                continue;
            };
            rows.push(ArchiveRow {
                id,
                record: serde_json::to_string(&record).map_err(ser_err)?,
            });
        }
        tables.push(ArchiveTable { entry_type, rows });
    }
    Ok(Archive {
        label: registry.label().to_string(),
        tables,
    })
}

/// Write every row of an archive into a registry's stores.
///
/// Existing rows with the same id are overwritten. Returns the number of
/// rows written.
pub async fn restore_registry(registry: &Registry, archive: &Archive) -> Result<usize, ArmoryError> {
    let mut written = 0;
    for table in &archive.tables {
        let category = registry.category(table.entry_type)?;
        for row in &table.rows {
            let record: RawRecord = serde_json::from_str(&row.record).map_err(ser_err)?;
            category.store().put(table.entry_type, &row.id, &record).await?;
            written += 1;
        }
    }
    tracing::info!(
        registry = registry.label(),
        source = %archive.label,
        rows = written,
        "restored archive"
    );
    Ok(written)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Archive {
        Archive {
            label: "compendium".into(),
            tables: vec![ArchiveTable {
                entry_type: EntryType::Weapon,
                rows: vec![ArchiveRow {
                    id: "w1".into(),
                    record: r#"{"name":"Rifle"}"#.into(),
                }],
            }],
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = ArchiveHeader::new();
        let restored = ArchiveHeader::from_bytes(&header.to_bytes()).expect("parse header");
        assert_eq!(restored, header);
        restored.validate().expect("valid");
    }

    #[test]
    fn archive_bytes_roundtrip() {
        let bytes = archive_to_bytes(&sample()).expect("encode");
        assert_eq!(&bytes[..4], MAGIC_BYTES);
        assert_eq!(archive_from_bytes(&bytes).expect("decode"), sample());
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let mut bytes = archive_to_bytes(&sample()).expect("encode");
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        assert!(archive_from_bytes(&bytes).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = archive_to_bytes(&sample()).expect("encode");
        bytes[0] = b'X';
        assert!(matches!(
            archive_from_bytes(&bytes),
            Err(ArmoryError::SerializationError(_))
        ));
        assert!(archive_from_bytes(b"AR").is_err());
    }

    #[test]
    fn checksum_separates_fields() {
        let mut a = sample();
        let mut b = sample();
        a.tables[0].rows[0].id = "ab".into();
        a.tables[0].rows[0].record = "c".into();
        b.tables[0].rows[0].id = "a".into();
        b.tables[0].rows[0].record = "bc".into();
        assert_ne!(a.checksum(), b.checksum());
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn digest_is_hex() {
        let bytes = archive_to_bytes(&sample()).expect("encode");
        assert_eq!(archive_digest(&bytes).len(), 64);
    }
}
