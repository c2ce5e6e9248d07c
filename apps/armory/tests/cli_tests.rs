//! # CLI Tests
//!
//! Drive the command layer against real redb files in a temp directory.

use armory::cli::{
    Settings, Side, cmd_export, cmd_import, cmd_init, cmd_list, cmd_load_pack, cmd_restore,
    cmd_show, cmd_sync, open_registry,
};
use armory_core::{ArmoryError, EntryType, Mech};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

// =============================================================================
// HELPERS
// =============================================================================

fn workspace(dir: &Path, roster: &str) -> Settings {
    Settings {
        compendium: dir.join("compendium.redb"),
        roster: dir.join(roster),
        label: "roster".to_string(),
    }
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, value.to_string()).expect("write json");
    path
}

fn content_pack() -> Value {
    json!({
        "weapon": [
            {"id": "w1", "name": "Assault Rifle", "size": "main"},
            {"id": "w2", "name": "Heavy Shotgun", "size": "main"},
            {"name": "Nameless"},
        ],
        "system": [{"id": "s1", "name": "Shield"}],
        "frame": [{
            "id": "everest",
            "name": "Everest",
            "stats": {"hp": "8"},
            "integrated": ["system:s1"],
        }],
    })
}

fn mech_pack(weapon: &str) -> Value {
    json!({
        "id": "mk1",
        "name": "Lodestar-1",
        "frame": "everest",
        "mounts": [{
            "mount_type": "main",
            "slots": [{"size": "main", "weapon": weapon, "mod": null}],
        }],
        "systems": [],
    })
}

/// Source id of the weapon in the first slot of roster mech `mk1`.
async fn roster_weapon(settings: &Settings) -> Option<String> {
    let roster = open_registry(&settings.roster, "check").expect("open roster");
    let mech = roster
        .category(EntryType::Mech)
        .expect("category")
        .get_by_id("mk1")
        .await
        .expect("get")
        .expect("mk1 exists");
    mech.view::<Mech, _>(|m| m.mounts[0].slots[0].weapon.clone())
        .flatten()
        .map(|weapon| weapon.origin_id())
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");

    cmd_init(&settings, false).expect("first init");
    assert!(matches!(
        cmd_init(&settings, false),
        Err(ArmoryError::IoError(_))
    ));
    cmd_init(&settings, true).expect("forced init");
}

#[tokio::test]
async fn pack_import_sync_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");
    cmd_init(&settings, false).expect("init");

    let pack = write_json(dir.path(), "pack.json", &content_pack());
    cmd_load_pack(&settings, &pack).await.expect("load pack");
    {
        let compendium = open_registry(&settings.compendium, "check").expect("open");
        let weapons = compendium
            .category(EntryType::Weapon)
            .expect("category")
            .list_ids()
            .await
            .expect("ids");
        assert_eq!(weapons, vec!["w1".to_string(), "w2".to_string()]);
    }

    let mech = write_json(dir.path(), "mech.json", &mech_pack("w1"));
    cmd_import(&settings, EntryType::Mech, &mech)
        .await
        .expect("import");
    assert_eq!(roster_weapon(&settings).await.as_deref(), Some("w1"));
    {
        // The frame's integrated system came along with the frame as a
        // shared row; no weapon row is stored under its source id.
        let roster = open_registry(&settings.roster, "check").expect("open");
        let systems = roster
            .category(EntryType::System)
            .expect("category")
            .list_ids()
            .await
            .expect("ids");
        assert_eq!(systems, vec!["s1".to_string()]);
        let weapons = roster
            .category(EntryType::Weapon)
            .expect("category")
            .list_ids()
            .await
            .expect("ids");
        assert_eq!(weapons.len(), 1);
        assert_ne!(weapons[0], "w1");
    }

    let synced = write_json(dir.path(), "mech2.json", &mech_pack("w2"));
    cmd_sync(&settings, "mk1", &synced).await.expect("sync");
    assert_eq!(roster_weapon(&settings).await.as_deref(), Some("w2"));

    cmd_show(&settings, Side::Roster, EntryType::Mech, "mk1", true)
        .await
        .expect("show");
    cmd_list(&settings, Side::Compendium, EntryType::Frame)
        .await
        .expect("list");
}

#[tokio::test]
async fn sync_of_unknown_mech_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");
    cmd_init(&settings, false).expect("init");

    let mech = write_json(dir.path(), "mech.json", &mech_pack("w1"));
    let result = cmd_sync(&settings, "ghost", &mech).await;
    assert!(matches!(result, Err(ArmoryError::NotFound(_))));
}

#[tokio::test]
async fn export_then_restore_into_fresh_roster() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");
    cmd_init(&settings, false).expect("init");

    let pack = write_json(dir.path(), "pack.json", &content_pack());
    cmd_load_pack(&settings, &pack).await.expect("load pack");
    let mech = write_json(dir.path(), "mech.json", &mech_pack("w1"));
    cmd_import(&settings, EntryType::Mech, &mech)
        .await
        .expect("import");

    let archive = dir.path().join("roster.armr");
    cmd_export(&settings, Side::Roster, &archive)
        .await
        .expect("export");

    let fresh = workspace(dir.path(), "fresh.redb");
    cmd_restore(&fresh, Side::Roster, &archive)
        .await
        .expect("restore");
    assert_eq!(roster_weapon(&fresh).await.as_deref(), Some("w1"));
}

#[tokio::test]
async fn corrupted_archive_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");
    let archive = dir.path().join("bad.armr");
    std::fs::write(&archive, b"not an archive").expect("write");

    assert!(cmd_restore(&settings, Side::Roster, &archive).await.is_err());
}

#[tokio::test]
async fn unknown_type_in_pack_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = workspace(dir.path(), "roster.redb");
    let pack = write_json(dir.path(), "pack.json", &json!({"talent": []}));

    let result = cmd_load_pack(&settings, &pack).await;
    assert!(matches!(result, Err(ArmoryError::UnknownEntryType(_))));
}
