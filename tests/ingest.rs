use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use kira_reflib::app::App;
use kira_reflib::catalog::{Catalog, RecordStore};
use kira_reflib::config::LibraryConfig;
use kira_reflib::domain::ReferenceStatus;
use kira_reflib::error::KiraError;
use kira_reflib::feed::NoFeed;
use kira_reflib::ingest::UploadRequest;
use kira_reflib::jobs::{JobHandle, JobRequest, JobTask, Scheduler};

#[derive(Clone, Default)]
struct MockScheduler {
    sent: Arc<Mutex<Vec<JobRequest>>>,
    offline: bool,
}

impl Scheduler for MockScheduler {
    fn dispatch(&self, request: &JobRequest) -> Result<JobHandle, KiraError> {
        if self.offline {
            return Err(KiraError::Dispatch("scheduler offline".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        Ok(JobHandle::new(format!("job-{}", sent.len())))
    }
}

fn app(temp: &TempDir, scheduler: MockScheduler) -> App<Catalog, MockScheduler, NoFeed> {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let config =
        LibraryConfig::for_roots(root.join("referenceLibrary"), root.join("temp"), "tmap-f3");
    fs::create_dir_all(&config.library_root).unwrap();
    fs::create_dir_all(&config.temp_root).unwrap();
    App::new(config, Catalog::in_memory(), scheduler, NoFeed)
}

fn fasta_of_size(path: &Utf8Path, size: usize) {
    let mut content = b">chr1\n".to_vec();
    content.resize(size - 1, b'A');
    content.push(b'\n');
    fs::write(path, content).unwrap();
}

fn zip_with(path: &Utf8Path, members: &[&str]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for member in members {
        writer
            .start_file(*member, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b">chr1\nACGT\n").unwrap();
    }
    writer.finish().unwrap();
}

fn request(short_name: &str, upload_name: &str, size: Option<u64>) -> UploadRequest {
    UploadRequest {
        short_name: short_name.to_string(),
        display_name: "Test genome".to_string(),
        upload_name: upload_name.to_string(),
        reported_size: size,
        version: "1".to_string(),
        ..UploadRequest::default()
    }
}

#[test]
fn fasta_upload_is_queued_with_copy_then_index() {
    let temp = tempfile::tempdir().unwrap();
    let scheduler = MockScheduler::default();
    let app = app(&temp, scheduler.clone());
    let upload = app.store().upload_path("testgenome.fasta");
    fasta_of_size(&upload, 100);

    let outcome = app
        .ingest_upload(request("testgenome", "testgenome.fasta", Some(100)))
        .unwrap();

    assert_eq!(outcome.reference.status, ReferenceStatus::Queued);
    assert_eq!(outcome.job_handle, Some(JobHandle::new("job-1")));
    assert!(outcome.dispatch_error.is_none());
    assert!(!outcome.reference.enabled);
    assert_eq!(outcome.reference.index_version, "tmap-f3");
    assert_eq!(outcome.reference.file_monitor, Some(outcome.monitor.id));

    assert!(!upload.as_std_path().exists());
    let staged = &outcome.reference.reference_path;
    assert_eq!(staged.file_name(), Some("testgenome.fasta"));
    assert!(staged.as_std_path().is_file());
    assert!(staged.starts_with(app.store().temp_root()));

    let stored = app.catalog().get_reference(outcome.reference.id).unwrap();
    assert_eq!(stored, outcome.reference);

    let sent = scheduler.sent.lock().unwrap();
    let tasks = sent[0].tasks();
    assert_matches!(tasks[0], JobTask::CopyReference { reference_id } if *reference_id == stored.id);
    assert_matches!(tasks[1], JobTask::BuildIndex { .. });
}

#[test]
fn zip_upload_unzips_its_single_fasta() {
    let temp = tempfile::tempdir().unwrap();
    let scheduler = MockScheduler::default();
    let app = app(&temp, scheduler.clone());
    let upload = app.store().upload_path("ecoli.zip");
    zip_with(&upload, &["ecoli/ecoli.fasta", "README.txt"]);

    let outcome = app.ingest_upload(request("ecoli", "ecoli.zip", None)).unwrap();
    assert_eq!(outcome.reference.status, ReferenceStatus::Queued);

    let sent = scheduler.sent.lock().unwrap();
    assert_matches!(
        sent[0].tasks()[0],
        JobTask::UnzipReference { member, .. } if member == "ecoli/ecoli.fasta"
    );
}

#[test]
fn short_name_error_is_reported_before_extension_error() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockScheduler::default());
    let upload = app.store().upload_path("genome.txt");
    fs::write(&upload, b">chr1\nACGT\n").unwrap();

    let err = app
        .ingest_upload(request("bad name!", "genome.txt", None))
        .unwrap_err();
    assert_matches!(err, KiraError::Validation(message) if message.contains("invalid short name"));
    assert!(!upload.as_std_path().exists());
    assert!(app.catalog().references().unwrap().is_empty());
}

#[test]
fn zip_with_two_fasta_files_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockScheduler::default());
    let upload = app.store().upload_path("pair.zip");
    zip_with(&upload, &["a.fasta", "b.fa"]);

    let err = app
        .ingest_upload(request("pair", "pair.zip", Some(1)))
        .unwrap_err();
    assert_matches!(err, KiraError::Validation(message) if message.contains("exactly one fasta file"));
    assert!(app.catalog().references().unwrap().is_empty());
}

#[test]
fn size_mismatch_is_rejected_and_upload_removed() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockScheduler::default());
    let upload = app.store().upload_path("short.fasta");
    fasta_of_size(&upload, 50);

    let err = app
        .ingest_upload(request("short", "short.fasta", Some(100)))
        .unwrap_err();
    assert_matches!(err, KiraError::Validation(message) if message.contains("50 bytes"));
    assert!(!upload.as_std_path().exists());
}

#[test]
fn duplicate_short_name_for_toolchain_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockScheduler::default());
    fasta_of_size(&app.store().upload_path("first.fasta"), 20);
    app.ingest_upload(request("dup", "first.fasta", Some(20)))
        .unwrap();

    fasta_of_size(&app.store().upload_path("second.fasta"), 20);
    let err = app
        .ingest_upload(request("dup", "second.fasta", Some(20)))
        .unwrap_err();
    assert_matches!(err, KiraError::Validation(message) if message.contains("already exists"));
    assert_eq!(app.catalog().references().unwrap().len(), 1);
}

#[test]
fn refused_dispatch_marks_record_and_monitor() {
    let temp = tempfile::tempdir().unwrap();
    let scheduler = MockScheduler {
        offline: true,
        ..MockScheduler::default()
    };
    let app = app(&temp, scheduler);
    fasta_of_size(&app.store().upload_path("lonely.fasta"), 30);

    let outcome = app
        .ingest_upload(request("lonely", "lonely.fasta", Some(30)))
        .unwrap();
    assert_eq!(outcome.reference.status, ReferenceStatus::Error);
    assert!(outcome.job_handle.is_none());
    assert!(outcome.monitor.status.starts_with("System Error:"));

    let monitor = app.catalog().get_monitor(outcome.monitor.id).unwrap();
    assert_eq!(monitor.status, outcome.monitor.status);
    let stored = app.catalog().get_reference(outcome.reference.id).unwrap();
    assert!(stored.verbose_error.unwrap()[0].contains("scheduler offline"));
}

#[test]
fn upload_name_outside_temp_root_is_rejected_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockScheduler::default());
    let outside = Utf8PathBuf::from_path_buf(temp.path().join("keep.fasta")).unwrap();
    fasta_of_size(&outside, 40);

    for upload_name in [outside.as_str(), "../keep.fasta", "..", "nested/keep.fasta"] {
        let err = app
            .ingest_upload(request("bad name!", upload_name, Some(40)))
            .unwrap_err();
        assert_matches!(err, KiraError::Validation(message) if message.contains("plain file name"));
    }
    assert!(outside.as_std_path().is_file());
    assert!(app.catalog().references().unwrap().is_empty());
}
