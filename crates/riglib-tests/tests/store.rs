use std::fs;

use pretty_assertions::assert_eq;
use riglib_db::{read_database, PathReplacement, RigRecord, RigStore};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn save_reload_roundtrips_field_for_field() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("rigs_database.json");
    let source = json!({
        "_schema": {"version": 2},
        "Apollo": {
            "path": "D:/Rigs/Apollo.ma",
            "image": "apollo.jpg",
            "tags": ["human", "male"],
            "collection": "Apollo&Artemis",
            "author": "Ramon Arango",
            "link": "https://ramonarango.gumroad.com/l/ArtemisApolloRig",
            "alternatives": ["D:/Rigs/Apollo_game.ma"],
            "notes": "face rig included",
            "favorite": true,
            "exists": true,
            "rating": 4
        },
        "Legacy": {
            "path": "D:/Rigs/Legacy.mb",
            "tags": "N/A",
            "collection": "N/A",
            "author": "N/A",
            "link": "N/A"
        },
        "Mixed": {
            "path": "D:/Rigs/Mixed.ma",
            "tags": "human, creature",
            "alternatives": ["D:/Rigs/Mixed_v2.ma", 5],
            "favorite": "yes"
        }
    });
    fs::write(&path, serde_json::to_string_pretty(&source)?)?;

    let store = RigStore::open(&path, Vec::new());
    assert_eq!(store.len(), 3);
    assert!(!store.display()["Apollo"].exists);
    store.save()?;

    let reloaded = RigStore::open(&path, Vec::new());
    assert_eq!(reloaded.raw_records(), store.raw_records());

    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(written["_schema"], json!({"version": 2}));
    assert_eq!(written["Apollo"]["rating"], json!(4));
    assert_eq!(written["Legacy"]["collection"], json!("N/A"));
    assert_eq!(written["Legacy"]["tags"], json!("N/A"));
    assert_eq!(written["Mixed"]["tags"], json!("human, creature"));
    assert_eq!(written["Mixed"]["alternatives"], json!(["D:/Rigs/Mixed_v2.ma", 5]));
    assert_eq!(written["Mixed"]["favorite"], json!("yes"));
    assert!(written["Apollo"].get("exists").is_none());
    Ok(())
}

#[test]
fn replacements_never_reach_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("rigs_database.json");
    let store = RigStore::open(
        &path,
        vec![
            PathReplacement::new("D:/", "/mnt/d/"),
            PathReplacement::new("/mnt/d/Old", "/mnt/d/New"),
        ],
    );
    store.insert(
        "Zeus",
        RigRecord::new("D:/Old/Zeus.ma").with_alternatives(["D:/Old/Zeus_v2.ma"]),
    );
    let raw_before = store.raw_records();

    let display = store.display_record("Zeus").unwrap();
    assert_eq!(display.path, "/mnt/d/New/Zeus.ma");
    assert_eq!(display.alternatives, vec!["/mnt/d/New/Zeus_v2.ma"]);
    assert_eq!(store.raw_records(), raw_before);

    store.save()?;
    assert_eq!(read_database(&path)?.records["Zeus"].path, "D:/Old/Zeus.ma");
    assert_eq!(store.find_by_path("/mnt/d/New/Zeus_v2.ma").as_deref(), Some("Zeus"));
    Ok(())
}
