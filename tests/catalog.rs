use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_reflib::catalog::{Catalog, RecordStore};
use kira_reflib::domain::ReferenceStatus;
use kira_reflib::error::KiraError;
use kira_reflib::jobs::JobHandle;
use kira_reflib::record::{FileMonitor, NewReference};

fn new_reference(short: &str, index_version: &str) -> NewReference {
    NewReference {
        short_name: short.parse().unwrap(),
        display_name: short.to_string(),
        version: "1".to_string(),
        index_version: index_version.to_string(),
        status: ReferenceStatus::Complete,
        reference_path: Utf8PathBuf::from("/lib").join(index_version).join(short),
        enabled: true,
        notes: String::new(),
        identity_hash: Some(format!("hash-{short}")),
        source: None,
    }
}

#[test]
fn catalog_file_survives_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("catalog.json")).unwrap();

    let catalog = Catalog::open(&path).unwrap();
    let record = catalog.insert_reference(new_reference("hg19", "tmap-f3")).unwrap();
    let monitor = catalog
        .insert_monitor(FileMonitor::for_download("http://example.org/hg19.zip"))
        .unwrap();
    drop(catalog);

    let reopened = Catalog::open(&path).unwrap();
    assert_eq!(reopened.get_reference(record.id).unwrap(), record);
    assert_eq!(reopened.get_monitor(monitor.id).unwrap(), monitor);
    let next = reopened.insert_reference(new_reference("mm10", "tmap-f3")).unwrap();
    assert!(next.id > record.id);
}

#[test]
fn job_handle_belongs_to_one_reference() {
    let catalog = Catalog::in_memory();
    let mut first = catalog.insert_reference(new_reference("a", "tmap-f3")).unwrap();
    let mut second = catalog.insert_reference(new_reference("b", "tmap-f3")).unwrap();

    first.job_handle = Some(JobHandle::new("job-9"));
    catalog.save_reference(&first).unwrap();
    second.job_handle = Some(JobHandle::new("job-9"));
    assert_matches!(
        catalog.save_reference(&second),
        Err(KiraError::Conflict { .. })
    );
}

#[test]
fn latest_prefers_highest_index_version() {
    let catalog = Catalog::in_memory();
    catalog.insert_reference(new_reference("ecoli", "tmap-f9")).unwrap();
    let newest = catalog.insert_reference(new_reference("ecoli", "tmap-f10")).unwrap();
    catalog.insert_reference(new_reference("other", "tmap-f11")).unwrap();

    let latest = catalog.latest_by_short_name("ecoli").unwrap().unwrap();
    assert_eq!(latest.id, newest.id);

    let hashed = catalog
        .find_by_identity_hashes(&["hash-other".to_string()])
        .unwrap();
    assert_eq!(hashed.len(), 1);
}

#[test]
fn failed_persist_leaves_catalog_unchanged() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("state")).unwrap();
    std::fs::create_dir_all(&dir).unwrap();
    let catalog = Catalog::open(&dir.join("catalog.json")).unwrap();
    let record = catalog.insert_reference(new_reference("hg19", "tmap-f3")).unwrap();

    std::fs::remove_dir_all(&dir).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();

    assert!(catalog.insert_reference(new_reference("mm10", "tmap-f3")).is_err());
    let mut renamed = record.clone();
    renamed.display_name = "Human".to_string();
    assert!(catalog.save_reference(&renamed).is_err());
    assert!(catalog.delete_reference(record.id).is_err());
    assert!(
        catalog
            .insert_monitor(FileMonitor::for_download("http://example.org/mm10.zip"))
            .is_err()
    );

    assert_eq!(catalog.references().unwrap(), vec![record.clone()]);
    assert!(catalog.monitors().unwrap().is_empty());
    assert_eq!(catalog.get_reference(record.id).unwrap(), record);
}

#[test]
fn short_name_is_unique_per_index_version() {
    let catalog = Catalog::in_memory();
    let first = catalog.insert_reference(new_reference("hg19", "tmap-f3")).unwrap();
    assert_matches!(
        catalog.insert_reference(new_reference("hg19", "tmap-f3")),
        Err(KiraError::Validation(message)) if message.contains("already exists")
    );
    let older = catalog.insert_reference(new_reference("hg19", "tmap-f2")).unwrap();

    let mut moved = older.clone();
    moved.index_version = "tmap-f3".to_string();
    assert_matches!(catalog.save_reference(&moved), Err(KiraError::Validation(_)));
    assert_eq!(catalog.get_reference(older.id).unwrap(), older);

    let mut same = first.clone();
    same.notes = "kept".to_string();
    assert_eq!(catalog.save_reference(&same).unwrap().notes, "kept");
    assert_eq!(catalog.references().unwrap().len(), 2);
}
