use std::cmp::Ordering;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::RecordStore;
use crate::domain::{ReferenceId, ReferenceStatus, ShortName, compare_versions};
use crate::error::KiraError;
use crate::record::{NewReference, ReferenceRecord};
use crate::sidecar::{GenomeInfo, SidecarRead, read_info};
use crate::store::{Store, file_size};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub partitions: Vec<String>,
    pub created: Vec<ScanEntry>,
    pub updated: Vec<ScanEntry>,
    pub deferred: Vec<ScanEntry>,
    pub unchanged: usize,
    pub skipped: Vec<SkippedDirectory>,
    pub failed: Vec<SkippedDirectory>,
    pub broken: Vec<BrokenReference>,
}

impl ScanReport {
    pub fn mutations(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEntry {
    pub id: ReferenceId,
    pub short_name: String,
    pub index_version: String,
    pub path: Utf8PathBuf,
}

impl ScanEntry {
    fn from_record(record: &ReferenceRecord) -> Self {
        Self {
            id: record.id,
            short_name: record.short_name.to_string(),
            index_version: record.index_version.clone(),
            path: record.reference_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDirectory {
    pub path: Utf8PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenReference {
    pub id: ReferenceId,
    pub short_name: String,
    pub reason: String,
}

pub fn scan<C: RecordStore + ?Sized>(
    store: &Store,
    catalog: &C,
    partition_prefix: &str,
) -> Result<ScanReport, KiraError> {
    let mut report = ScanReport::default();
    let partitions = store.partitions(partition_prefix)?;
    report.partitions = partitions
        .iter()
        .filter_map(|path| path.file_name().map(str::to_string))
        .collect();
    debug!(partitions = ?report.partitions, "reference scanner found partitions");

    for partition in &partitions {
        let candidates = match store.candidates(partition) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(partition = %partition, "could not list partition: {err}");
                report.failed.push(SkippedDirectory {
                    path: partition.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        for dir in candidates {
            if let Err(err) = reconcile_directory(catalog, &dir, &mut report) {
                warn!(path = %dir, "could not reconcile directory: {err}");
                report.failed.push(SkippedDirectory {
                    path: dir,
                    reason: err.to_string(),
                });
            }
        }
    }

    report.broken = find_broken(catalog)?;
    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        deferred = report.deferred.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        broken = report.broken.len(),
        "library scan finished"
    );
    Ok(report)
}

fn reconcile_directory<C: RecordStore + ?Sized>(
    catalog: &C,
    dir: &Utf8Path,
    report: &mut ScanReport,
) -> Result<(), KiraError> {
    let Some(name) = dir.file_name() else {
        return Ok(());
    };
    let short_name = match name.parse::<ShortName>() {
        Ok(short_name) => short_name,
        Err(err) => {
            warn!(path = %dir, "skipping directory: {err}");
            report.skipped.push(SkippedDirectory {
                path: dir.to_path_buf(),
                reason: err.to_string(),
            });
            return Ok(());
        }
    };

    let info = match read_info(&dir.join(format!("{name}.info.txt"))) {
        SidecarRead::Found(info) => info,
        SidecarRead::Malformed(reason) => {
            report.skipped.push(SkippedDirectory {
                path: dir.to_path_buf(),
                reason: format!("unusable info.txt: {reason}"),
            });
            return Ok(());
        }
        SidecarRead::Absent => {
            report.skipped.push(SkippedDirectory {
                path: dir.to_path_buf(),
                reason: "missing info.txt".to_string(),
            });
            return Ok(());
        }
    };

    let Some(mut record) = catalog.latest_by_short_name(name)? else {
        let created = catalog.insert_reference(NewReference {
            short_name,
            display_name: info.genome_name.clone(),
            version: info.genome_version.clone(),
            index_version: info.index_version.clone(),
            status: ReferenceStatus::Complete,
            reference_path: dir.to_path_buf(),
            enabled: true,
            notes: String::new(),
            identity_hash: None,
            source: None,
        })?;
        info!(
            id = %created.id,
            short_name = %created.short_name,
            index_version = %created.index_version,
            "created reference from library scan"
        );
        report.created.push(ScanEntry::from_record(&created));
        return Ok(());
    };

    let on_disk = compare_versions(&info.index_version, &record.index_version);
    if on_disk == Ordering::Less {
        debug!(
            short_name = %record.short_name,
            tracked = %record.index_version,
            found = %info.index_version,
            "older index on disk; keeping tracked version"
        );
        report.unchanged += 1;
        return Ok(());
    }

    let needs_update = if record.index_version != info.index_version {
        true
    } else {
        refresh_needed(&record, &info, dir)
    };
    if !needs_update {
        report.unchanged += 1;
        return Ok(());
    }

    if record.status.is_busy() {
        debug!(
            id = %record.id,
            status = %record.status,
            "reference has a job in flight; deferring"
        );
        report.deferred.push(ScanEntry::from_record(&record));
        return Ok(());
    }

    if record.index_version != info.index_version {
        debug!(
            id = %record.id,
            from = %record.index_version,
            to = %info.index_version,
            "updating reference to index found on disk"
        );
        if record.status != ReferenceStatus::Complete {
            record.transition(ReferenceStatus::Complete)?;
        }
        record.verbose_error = None;
        record.reference_path = dir.to_path_buf();
    } else if !record.reference_path.as_std_path().is_dir() {
        record.reference_path = dir.to_path_buf();
    }
    record.display_name = info.genome_name;
    record.version = info.genome_version;
    record.index_version = info.index_version;

    let saved = catalog.save_reference(&record)?;
    report.updated.push(ScanEntry::from_record(&saved));
    Ok(())
}

fn refresh_needed(record: &ReferenceRecord, info: &GenomeInfo, dir: &Utf8Path) -> bool {
    if record.reference_path.as_path() == dir {
        record.display_name != info.genome_name || record.version != info.genome_version
    } else {
        !record.reference_path.as_std_path().is_dir()
    }
}

pub fn check_reference(record: &ReferenceRecord) -> Result<(), KiraError> {
    let broken = |reason: String| KiraError::BrokenReference {
        short_name: record.short_name.to_string(),
        reason,
    };
    match read_info(&record.sidecar_path()) {
        SidecarRead::Found(_) => {}
        SidecarRead::Malformed(reason) => {
            return Err(broken(format!("unusable info.txt: {reason}")));
        }
        SidecarRead::Absent => return Err(broken("missing info.txt".to_string())),
    }
    if file_size(&record.fasta_path()).is_none() {
        return Err(broken(format!("missing {}", record.fasta_path())));
    }
    Ok(())
}

pub fn find_broken<C: RecordStore + ?Sized>(
    catalog: &C,
) -> Result<Vec<BrokenReference>, KiraError> {
    let mut out = Vec::new();
    for record in catalog.references()? {
        if record.status != ReferenceStatus::Complete {
            continue;
        }
        if let Err(KiraError::BrokenReference { short_name, reason }) = check_reference(&record) {
            warn!(id = %record.id, short_name = %short_name, reason = %reason, "broken reference");
            out.push(BrokenReference {
                id: record.id,
                short_name,
                reason,
            });
        }
    }
    Ok(out)
}
