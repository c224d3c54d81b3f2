use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use kira_reflib::app::App;
use kira_reflib::catalog::{Catalog, RecordStore};
use kira_reflib::config::LibraryConfig;
use kira_reflib::domain::{MonitorId, ReferenceId, ReferenceStatus};
use kira_reflib::error::KiraError;
use kira_reflib::feed::NoFeed;
use kira_reflib::jobs::NoScheduler;
use kira_reflib::reconcile;
use kira_reflib::record::{FileMonitor, NewReference, ReferenceRecord};
use kira_reflib::sidecar::{GenomeInfo, write_info};

fn app(temp: &TempDir) -> App<Catalog, NoScheduler, NoFeed> {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let config =
        LibraryConfig::for_roots(root.join("referenceLibrary"), root.join("temp"), "tmap-f3");
    fs::create_dir_all(&config.library_root).unwrap();
    App::new(config, Catalog::in_memory(), NoScheduler, NoFeed)
}

fn install(library: &Utf8Path, partition: &str, short: &str, info: GenomeInfo) -> Utf8PathBuf {
    let dir = library.join(partition).join(short);
    fs::create_dir_all(&dir).unwrap();
    write_info(&dir.join(format!("{short}.info.txt")), &info).unwrap();
    fs::write(dir.join(format!("{short}.fasta")), b">chr1\nACGT\n").unwrap();
    dir
}

fn complete(short: &str, name: &str, index_version: &str, dir: Utf8PathBuf) -> NewReference {
    NewReference {
        short_name: short.parse().unwrap(),
        display_name: name.to_string(),
        version: "K12".to_string(),
        index_version: index_version.to_string(),
        status: ReferenceStatus::Complete,
        reference_path: dir,
        enabled: true,
        notes: String::new(),
        identity_hash: None,
        source: None,
    }
}

/// Catalog that refuses to create one short name.
struct RefusingCatalog {
    inner: Catalog,
    refused: &'static str,
}

impl RecordStore for RefusingCatalog {
    fn insert_reference(&self, new: NewReference) -> Result<ReferenceRecord, KiraError> {
        if new.short_name == *self.refused {
            return Err(KiraError::CatalogPersist("disk quota exceeded".to_string()));
        }
        self.inner.insert_reference(new)
    }

    fn get_reference(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError> {
        self.inner.get_reference(id)
    }

    fn save_reference(&self, record: &ReferenceRecord) -> Result<ReferenceRecord, KiraError> {
        self.inner.save_reference(record)
    }

    fn delete_reference(&self, id: ReferenceId) -> Result<(), KiraError> {
        self.inner.delete_reference(id)
    }

    fn references(&self) -> Result<Vec<ReferenceRecord>, KiraError> {
        self.inner.references()
    }

    fn insert_monitor(&self, monitor: FileMonitor) -> Result<FileMonitor, KiraError> {
        self.inner.insert_monitor(monitor)
    }

    fn get_monitor(&self, id: MonitorId) -> Result<FileMonitor, KiraError> {
        self.inner.get_monitor(id)
    }

    fn save_monitor(&self, monitor: &FileMonitor) -> Result<(), KiraError> {
        self.inner.save_monitor(monitor)
    }

    fn monitors(&self) -> Result<Vec<FileMonitor>, KiraError> {
        self.inner.monitors()
    }
}

#[test]
fn scan_creates_records_and_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let dir = install(
        &app.config().library_root,
        "tmap-f3",
        "hg19",
        GenomeInfo::new("Homo sapiens", "hg19", "tmap-f3"),
    );

    let first = app.scan_library().unwrap();
    assert_eq!(first.created.len(), 1);
    assert_eq!(first.partitions, vec!["tmap-f3"]);

    let records = app.catalog().references().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.short_name.as_str(), "hg19");
    assert_eq!(record.display_name, "Homo sapiens");
    assert_eq!(record.status, ReferenceStatus::Complete);
    assert!(record.enabled);
    assert_eq!(record.reference_path, dir);

    let second = app.scan_library().unwrap();
    assert_eq!(second.mutations(), 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(app.catalog().references().unwrap(), records);
}

#[test]
fn newest_index_version_wins_across_partitions() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let library = app.config().library_root.clone();
    install(&library, "tmap1", "ecoli", GenomeInfo::new("E. coli", "K12", "1"));
    let newer = install(&library, "tmap2", "ecoli", GenomeInfo::new("E. coli", "K12", "2"));

    app.scan_library().unwrap();
    let again = app.scan_library().unwrap();
    assert_eq!(again.mutations(), 0);

    let records = app.catalog().references().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].index_version, "2");
    assert_eq!(records[0].reference_path, newer);
}

#[test]
fn directories_without_usable_sidecar_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let partition = app.config().library_root.join("tmap-f3");
    fs::create_dir_all(partition.join("half_built")).unwrap();
    fs::create_dir_all(partition.join("bad name")).unwrap();
    let garbled = partition.join("garbled");
    fs::create_dir_all(&garbled).unwrap();
    fs::write(garbled.join("garbled.info.txt"), "genome_name\tonly\n").unwrap();

    let report = app.scan_library().unwrap();
    assert_eq!(report.mutations(), 0);
    assert_eq!(report.skipped.len(), 3);
    assert!(app.catalog().references().unwrap().is_empty());
}

#[test]
fn busy_reference_is_deferred() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let library = app.config().library_root.clone();
    let old_dir = install(&library, "tmap-f2", "mm10", GenomeInfo::new("Mouse", "mm10", "tmap-f2"));
    install(&library, "tmap-f3", "mm10", GenomeInfo::new("Mouse", "mm10", "tmap-f3"));

    app.catalog()
        .insert_reference(NewReference {
            short_name: "mm10".parse().unwrap(),
            display_name: "Mouse".to_string(),
            version: "mm10".to_string(),
            index_version: "tmap-f2".to_string(),
            status: ReferenceStatus::Indexing,
            reference_path: old_dir.clone(),
            enabled: true,
            notes: String::new(),
            identity_hash: None,
            source: None,
        })
        .unwrap();

    let report = app.scan_library().unwrap();
    assert_eq!(report.deferred.len(), 1);
    let record = &app.catalog().references().unwrap()[0];
    assert_eq!(record.status, ReferenceStatus::Indexing);
    assert_eq!(record.index_version, "tmap-f2");
    assert_eq!(record.reference_path, old_dir);
}

#[test]
fn check_reports_complete_reference_missing_fasta() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let dir = install(
        &app.config().library_root,
        "tmap-f3",
        "phix",
        GenomeInfo::new("PhiX", "1", "tmap-f3"),
    );
    app.scan_library().unwrap();
    fs::remove_file(dir.join("phix.fasta")).unwrap();

    let result = app.check_references().unwrap();
    assert_eq!(result.broken.len(), 1);
    assert_eq!(result.broken[0].short_name, "phix");
}

#[test]
fn older_tracked_index_is_left_alone() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let library = app.config().library_root.clone();
    let old_dir = install(&library, "tmap1", "ecoli", GenomeInfo::new("E. coli", "K12", "1"));
    let new_dir = install(&library, "tmap2", "ecoli", GenomeInfo::new("E. coli", "K12", "2"));
    let old = app
        .catalog()
        .insert_reference(complete("ecoli", "E. coli (first build)", "1", old_dir))
        .unwrap();
    let new = app
        .catalog()
        .insert_reference(complete("ecoli", "E. coli", "2", new_dir))
        .unwrap();

    let report = app.scan_library().unwrap();
    assert_eq!(report.mutations(), 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(app.catalog().get_reference(old.id).unwrap(), old);
    assert_eq!(app.catalog().get_reference(new.id).unwrap(), new);
}

#[test]
fn one_failing_directory_does_not_stop_the_scan() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp);
    let library = app.config().library_root.clone();
    let refused = install(&library, "tmap-f3", "aaa", GenomeInfo::new("A", "1", "tmap-f3"));
    install(&library, "tmap-f3", "zzz", GenomeInfo::new("Z", "1", "tmap-f3"));
    let catalog = RefusingCatalog {
        inner: Catalog::in_memory(),
        refused: "aaa",
    };

    let report = reconcile::scan(app.store(), &catalog, &app.config().partition_prefix).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, refused);
    assert!(report.failed[0].reason.contains("disk quota exceeded"));
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].short_name, "zzz");
    assert_eq!(catalog.references().unwrap().len(), 1);
}
