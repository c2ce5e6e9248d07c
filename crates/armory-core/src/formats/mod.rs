//! # Formats
//!
//! Serialization formats for moving whole content universes around.
//!
//! The archive format is a pure transformation between bytes and an
//! `Archive` value. File I/O stays in the app layer.

mod archive;

pub use archive::{
    Archive, ArchiveHeader, ArchiveRow, ArchiveTable, MAX_ARCHIVE_SIZE, archive_from_bytes,
    archive_to_bytes, export_registry, restore_registry,
};

#[cfg(feature = "crypto-hash")]
pub use archive::archive_digest;
