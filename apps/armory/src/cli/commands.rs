//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the registries it needs, runs under one fresh
//! resolution context and drops the registries before returning, so the redb
//! files are released between invocations.

use super::Side;
use crate::config::ArmoryConfig;
use armory_core::formats::{MAX_ARCHIVE_SIZE, archive_digest};
use armory_core::{
    ArmoryError, Converter, EntryKey, EntryType, LiveRef, RawRecord, RedbStore, RefToken, Registry,
    ResolutionContext, SharedStore, archive_from_bytes, archive_to_bytes, export_registry, pack,
    restore_registry, unpack,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a content pack or packed record file (100 MB).
const MAX_PACK_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ArmoryError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ArmoryError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ArmoryError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input path.
///
/// Canonicalizes the path to resolve symlinks and "..", and ensures it names
/// an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, ArmoryError> {
    let canonical = path.canonicalize().map_err(|e| {
        ArmoryError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ArmoryError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, ArmoryError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        ArmoryError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(ArmoryError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| ArmoryError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a size-checked file.
fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, ArmoryError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, max_size)?;
    std::fs::read(&path).map_err(|e| ArmoryError::IoError(format!("Read file: {}", e)))
}

/// Read a file holding one JSON object.
fn read_json_object(path: &Path) -> Result<RawRecord, ArmoryError> {
    let data = read_input(path, MAX_PACK_FILE_SIZE)?;
    match serde_json::from_slice::<Value>(&data) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(ArmoryError::SerializationError(format!(
            "'{}' does not hold a JSON object",
            path.display()
        ))),
        Err(e) => Err(ArmoryError::SerializationError(format!("Invalid JSON: {}", e))),
    }
}

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Database locations after config and flags are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub compendium: PathBuf,
    pub roster: PathBuf,
    pub label: String,
}

impl Settings {
    /// Merge the config file with command-line overrides.
    ///
    /// The two registries must live in different files: redb allows only
    /// one open handle per database.
    pub fn resolve(
        config: ArmoryConfig,
        compendium: Option<PathBuf>,
        roster: Option<PathBuf>,
    ) -> Result<Self, ArmoryError> {
        let config = config.with_overrides(compendium, roster);
        if config.compendium == config.roster {
            return Err(ArmoryError::IoError(format!(
                "Compendium and roster must be different files (both are '{}')",
                config.compendium.display()
            )));
        }
        Ok(Self {
            compendium: config.compendium,
            roster: config.roster,
            label: config.label,
        })
    }

    fn open(&self, side: Side) -> Result<Registry, ArmoryError> {
        match side {
            Side::Roster => open_registry(&self.roster, &self.label),
            Side::Compendium => open_registry(&self.compendium, "compendium"),
        }
    }

    /// Roster as home, compendium as source.
    fn converter(&self) -> Result<Converter, ArmoryError> {
        Ok(Converter::new(
            self.open(Side::Roster)?,
            self.open(Side::Compendium)?,
        ))
    }
}

/// Open a redb-backed registry, creating the file if needed.
pub fn open_registry(path: &Path, label: &str) -> Result<Registry, ArmoryError> {
    let store = RedbStore::open(path)?;
    Ok(Registry::new(label, Arc::new(store) as SharedStore))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create empty compendium and roster databases.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), ArmoryError> {
    for path in [&settings.compendium, &settings.roster] {
        if path.exists() {
            if !force {
                return Err(ArmoryError::IoError(format!(
                    "Database '{}' already exists. Use --force to overwrite.",
                    path.display()
                )));
            }
            std::fs::remove_file(path)
                .map_err(|e| ArmoryError::IoError(format!("Remove database: {}", e)))?;
        }
        let _store = RedbStore::open(path)?;
        println!("Initialized new redb database at {:?}", path);
    }
    Ok(())
}

// =============================================================================
// LOAD PACK COMMAND
// =============================================================================

/// Load a content pack into the compendium.
///
/// The pack is a JSON object mapping entry type names to arrays of packed
/// records. Records without an id are skipped with a warning.
pub async fn cmd_load_pack(settings: &Settings, file: &Path) -> Result<(), ArmoryError> {
    let pack_file = read_json_object(file)?;
    let compendium = settings.open(Side::Compendium)?;

    let mut loaded: BTreeMap<String, usize> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut flags = 0usize;

    for (type_name, records) in &pack_file {
        let entry_type: EntryType = type_name.parse()?;
        let records = records.as_array().ok_or_else(|| {
            ArmoryError::SerializationError(format!("'{}' is not an array", type_name))
        })?;
        let category = compendium.category(entry_type)?;

        for (i, packed) in records.iter().enumerate() {
            let Some(packed) = packed.as_object() else {
                tracing::warn!(entry_type = %entry_type, index = i, "skipping non-object record");
                skipped += 1;
                continue;
            };
            let outcome = unpack(entry_type, packed)?;
            flags += outcome.flags.len();
            let Some(id) = outcome.id() else {
                tracing::warn!(entry_type = %entry_type, index = i, "skipping record without id");
                skipped += 1;
                continue;
            };
            category.store().put(entry_type, id, &outcome.record).await?;
            *loaded.entry(entry_type.to_string()).or_default() += 1;
        }
    }

    let total: usize = loaded.values().sum();
    tracing::info!(rows = total, skipped, flags, "loaded content pack");
    print_json(&json!({
        "loaded": loaded,
        "skipped": skipped,
        "flags": flags,
    }));
    Ok(())
}

// =============================================================================
// IMPORT / SYNC COMMANDS
// =============================================================================

/// Import a packed entry into the roster.
pub async fn cmd_import(
    settings: &Settings,
    entry_type: EntryType,
    file: &Path,
) -> Result<(), ArmoryError> {
    let packed = read_json_object(file)?;
    let converter = settings.converter()?;
    let ctx = ResolutionContext::new();

    let (entry, report) = converter.import(&ctx, entry_type, &packed).await?;
    print_json(&json!({
        "entry": entry.key(),
        "name": entry.name(),
        "report": report,
    }));
    Ok(())
}

/// Resolve a roster entry that the caller named explicitly.
async fn require(
    registry: &Registry,
    ctx: &ResolutionContext,
    entry_type: EntryType,
    id: &str,
) -> Result<LiveRef, ArmoryError> {
    registry
        .resolve(ctx, &RefToken::new(entry_type, id))
        .await?
        .ok_or_else(|| ArmoryError::NotFound(EntryKey::new(entry_type, id)))
}

/// Re-sync a roster mech from a packed mech.
pub async fn cmd_sync(settings: &Settings, mech_id: &str, file: &Path) -> Result<(), ArmoryError> {
    let packed = read_json_object(file)?;
    let converter = settings.converter()?;
    let ctx = ResolutionContext::new();

    let mech = require(converter.home(), &ctx, EntryType::Mech, mech_id).await?;
    let report = converter.sync_mech(&ctx, &mech, &packed).await?;
    print_json(&json!({
        "entry": mech.key(),
        "report": report,
    }));
    Ok(())
}

/// Re-sync a roster pilot from a `{"pilot": ..., "mechs": [...]}` bundle.
pub async fn cmd_sync_pilot(
    settings: &Settings,
    pilot_id: &str,
    file: &Path,
) -> Result<(), ArmoryError> {
    let bundle = read_json_object(file)?;
    let (packed, mechs) = split_pilot_bundle(&bundle)?;
    let converter = settings.converter()?;
    let ctx = ResolutionContext::new();

    let pilot = require(converter.home(), &ctx, EntryType::Pilot, pilot_id).await?;
    let report = converter.sync_pilot(&ctx, &pilot, &packed, &mechs).await?;
    print_json(&json!({
        "entry": pilot.key(),
        "report": report,
    }));
    Ok(())
}

/// Split a pilot bundle into the packed pilot and its packed mechs.
fn split_pilot_bundle(bundle: &RawRecord) -> Result<(RawRecord, Vec<RawRecord>), ArmoryError> {
    let pilot = bundle
        .get("pilot")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| {
            ArmoryError::SerializationError("Bundle has no \"pilot\" object".to_string())
        })?;

    let mechs = match bundle.get("mechs") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object().cloned().ok_or_else(|| {
                    ArmoryError::SerializationError("Bundle mechs must be objects".to_string())
                })
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(ArmoryError::SerializationError(
                "Bundle \"mechs\" must be an array".to_string(),
            ));
        }
    };
    Ok((pilot, mechs))
}

// =============================================================================
// SHOW / LIST COMMANDS
// =============================================================================

/// Print one entry, normalized or packed.
pub async fn cmd_show(
    settings: &Settings,
    side: Side,
    entry_type: EntryType,
    id: &str,
    packed: bool,
) -> Result<(), ArmoryError> {
    let registry = settings.open(side)?;
    let entry = registry
        .category(entry_type)?
        .get_by_id(id)
        .await?
        .ok_or_else(|| ArmoryError::NotFound(EntryKey::new(entry_type, id)))?;

    let record = entry.save()?;
    let record = if packed {
        pack(entry_type, &record)
    } else {
        record
    };
    print_json(&Value::Object(record));
    Ok(())
}

/// List ids and names of one entry type.
pub async fn cmd_list(
    settings: &Settings,
    side: Side,
    entry_type: EntryType,
) -> Result<(), ArmoryError> {
    let registry = settings.open(side)?;
    let entries = registry.category(entry_type)?.list().await?;

    let rows: Vec<Value> = entries
        .iter()
        .map(|entry| json!({"id": entry.id(), "name": entry.name()}))
        .collect();
    print_json(&json!({
        "entry_type": entry_type,
        "count": rows.len(),
        "entries": rows,
    }));
    Ok(())
}

// =============================================================================
// EXPORT / RESTORE COMMANDS
// =============================================================================

/// Export a registry to a binary archive.
pub async fn cmd_export(settings: &Settings, side: Side, output: &Path) -> Result<(), ArmoryError> {
    let output = validate_output_path(output)?;
    let registry = settings.open(side)?;

    let archive = export_registry(&registry).await?;
    let bytes = archive_to_bytes(&archive)?;
    std::fs::write(&output, &bytes)
        .map_err(|e| ArmoryError::IoError(format!("Write archive: {}", e)))?;

    print_json(&json!({
        "path": output.display().to_string(),
        "rows": archive.len(),
        "bytes": bytes.len(),
        "checksum": format!("{:016x}", archive.checksum()),
        "blake3": archive_digest(&bytes),
    }));
    Ok(())
}

/// Restore a registry from a binary archive.
pub async fn cmd_restore(settings: &Settings, side: Side, input: &Path) -> Result<(), ArmoryError> {
    let bytes = read_input(input, MAX_ARCHIVE_SIZE as u64)?;
    let archive = archive_from_bytes(&bytes)?;
    let registry = settings.open(side)?;

    let written = restore_registry(&registry, &archive).await?;
    print_json(&json!({
        "source": archive.label,
        "rows": written,
    }));
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_file_for_both_registries_is_rejected() {
        let config = ArmoryConfig::default();
        let result = Settings::resolve(
            config,
            Some(PathBuf::from("one.redb")),
            Some(PathBuf::from("one.redb")),
        );
        assert!(matches!(result, Err(ArmoryError::IoError(_))));
    }

    #[test]
    fn pilot_bundle_splits() {
        let bundle = json!({
            "pilot": {"id": "p1", "callsign": "Ghost"},
            "mechs": [{"id": "mk1"}, {"id": "mk2"}],
        });
        let (pilot, mechs) =
            split_pilot_bundle(bundle.as_object().expect("object")).expect("split");
        assert_eq!(pilot.get("id"), Some(&json!("p1")));
        assert_eq!(mechs.len(), 2);
    }

    #[test]
    fn pilot_bundle_without_mechs_is_fine() {
        let bundle = json!({"pilot": {"id": "p1"}});
        let (_, mechs) = split_pilot_bundle(bundle.as_object().expect("object")).expect("split");
        assert!(mechs.is_empty());
    }

    #[test]
    fn pilot_bundle_requires_pilot_object() {
        let bundle = json!({"mechs": []});
        assert!(split_pilot_bundle(bundle.as_object().expect("object")).is_err());

        let bundle = json!({"pilot": {"id": "p1"}, "mechs": ["mk1"]});
        assert!(split_pilot_bundle(bundle.as_object().expect("object")).is_err());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.json");
        std::fs::write(&path, vec![b' '; 64]).expect("write");
        assert!(validate_file_size(&path, 16).is_err());
        assert!(validate_file_size(&path, 64).is_ok());
    }

    #[test]
    fn output_path_needs_existing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_output_path(&dir.path().join("out.armr")).is_ok());
        assert!(validate_output_path(&dir.path().join("missing/out.armr")).is_err());
    }

    #[test]
    fn non_object_json_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("list.json");
        std::fs::write(&path, "[1, 2]").expect("write");
        assert!(matches!(
            read_json_object(&path),
            Err(ArmoryError::SerializationError(_))
        ));
    }
}
