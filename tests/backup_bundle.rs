mod test_support;

use serde_json::json;
use test_support::{
    create_room, request_ok, select_workspace, spawn_sidecar, temp_dir,
};

#[test]
fn bundle_export_records_a_verifiable_checksum() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-backup-src");
    create_room(&mut stdin, &mut reader, "1", "Aula");

    let out_dir = temp_dir("branchd-backup-out");
    let bundle_path = out_dir.join("workspace.branchbackup.zip");

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.export",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("branchd-workspace-v1")
    );
    assert_eq!(exported.get("entryCount").and_then(|v| v.as_i64()), Some(3));
    let sha = exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .expect("dbSha256")
        .to_string();
    assert_eq!(sha.len(), 64);

    // The manifest inside the bundle carries the same digest.
    let f = std::fs::File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("manifest.json").expect("manifest entry"),
        &mut manifest,
    )
    .expect("read manifest");
    assert!(manifest.contains("branchd-workspace-v1"));
    assert!(manifest.contains(&sha));
    archive
        .by_name("db/branch.sqlite3")
        .expect("database entry in bundle");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn bundle_import_restores_rows_into_a_fresh_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-backup-roundtrip");
    create_room(&mut stdin, &mut reader, "1", "Aula Ekspor");

    let out_dir = temp_dir("branchd-backup-bundle");
    let bundle_path = out_dir.join("workspace.branchbackup.zip");
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.export",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );

    // Import into a second sidecar with an empty workspace.
    let (_child2, mut stdin2, mut reader2) = spawn_sidecar();
    let workspace2 = select_workspace(&mut stdin2, &mut reader2, "branchd-backup-dst");

    let listed = request_ok(&mut stdin2, &mut reader2, "1", "rooms.list", json!({}));
    assert_eq!(
        listed.get("rooms").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let imported = request_ok(
        &mut stdin2,
        &mut reader2,
        "2",
        "backup.import",
        json!({ "inPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("branchd-workspace-v1")
    );

    let listed = request_ok(&mut stdin2, &mut reader2, "3", "rooms.list", json!({}));
    let rooms = listed.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(
        rooms[0].get("name").and_then(|v| v.as_str()),
        Some("Aula Ekspor")
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn plain_sqlite_files_import_as_legacy() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-backup-legacy-src");
    create_room(&mut stdin, &mut reader, "1", "Aula Lama");

    // A raw database file, not a zip bundle.
    let db_copy_dir = temp_dir("branchd-backup-legacy-copy");
    let db_copy = db_copy_dir.join("old.sqlite3");
    std::fs::copy(workspace.join("branch.sqlite3"), &db_copy).expect("copy raw db");

    let (_child2, mut stdin2, mut reader2) = spawn_sidecar();
    let workspace2 = select_workspace(&mut stdin2, &mut reader2, "branchd-backup-legacy-dst");
    let imported = request_ok(
        &mut stdin2,
        &mut reader2,
        "1",
        "backup.import",
        json!({ "inPath": db_copy.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("legacy-sqlite3")
    );

    let listed = request_ok(&mut stdin2, &mut reader2, "2", "rooms.list", json!({}));
    assert_eq!(
        listed
            .get("rooms")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|r| r.get("name"))
            .and_then(|v| v.as_str()),
        Some("Aula Lama")
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(db_copy_dir);
}
