use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::RecordStore;
use crate::config::LibraryConfig;
use crate::domain::{ReferenceId, ReferenceStatus, ShortName};
use crate::error::KiraError;
use crate::feed::CatalogFeed;
use crate::jobs::Scheduler;
use crate::reconcile::{self, BrokenReference, ScanReport};
use crate::record::ReferenceRecord;
use crate::rename::rename_reference;
use crate::sidecar::GenomeInfo;
use crate::store::{Store, file_size};

pub struct App<C: RecordStore, S: Scheduler, F: CatalogFeed> {
    pub(crate) config: LibraryConfig,
    pub(crate) store: Store,
    pub(crate) catalog: C,
    pub(crate) scheduler: S,
    pub(crate) feed: F,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub references: Vec<ReferenceRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastaFile {
    pub path: Utf8PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDetails {
    pub reference: ReferenceRecord,
    pub genome_info: Option<GenomeInfo>,
    pub fasta: Option<FastaFile>,
    pub stale_index: bool,
    pub error_summary: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ReferenceEdit {
    pub short_name: String,
    pub display_name: String,
    pub notes: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub id: ReferenceId,
    pub removed_path: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub broken: Vec<BrokenReference>,
}

impl<C: RecordStore, S: Scheduler, F: CatalogFeed> App<C, S, F> {
    pub fn new(config: LibraryConfig, catalog: C, scheduler: S, feed: F) -> Self {
        let store = config.store();
        Self {
            config,
            store,
            catalog,
            scheduler,
            feed,
        }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn list(&self) -> Result<ListResult, KiraError> {
        let mut references = self.catalog.references()?;
        references.sort_by(|a, b| {
            a.short_name
                .cmp(&b.short_name)
                .then_with(|| a.index_version.cmp(&b.index_version))
        });
        Ok(ListResult { references })
    }

    pub fn scan_library(&self) -> Result<ScanReport, KiraError> {
        reconcile::scan(&self.store, &self.catalog, &self.config.partition_prefix)
    }

    pub fn check_references(&self) -> Result<CheckResult, KiraError> {
        Ok(CheckResult {
            broken: reconcile::find_broken(&self.catalog)?,
        })
    }

    pub fn reference_details(&self, id: ReferenceId) -> Result<ReferenceDetails, KiraError> {
        let reference = self.catalog.get_reference(id)?;
        let genome_info = GenomeInfo::read(&reference.sidecar_path());
        let fasta_path = reference.fasta_path();
        let fasta = file_size(&fasta_path).map(|size| FastaFile {
            path: fasta_path,
            size,
        });
        let stale_index = reference.is_stale(&self.config.index_version)
            && reference.status != ReferenceStatus::Indexing;
        let error_summary = reference.error_summary();
        Ok(ReferenceDetails {
            reference,
            genome_info,
            fasta,
            stale_index,
            error_summary,
        })
    }

    pub fn edit_reference(
        &self,
        id: ReferenceId,
        edit: ReferenceEdit,
    ) -> Result<ReferenceRecord, KiraError> {
        let mut record = self.catalog.get_reference(id)?;
        let new_short: ShortName = edit.short_name.parse()?;
        let short_changed = record.short_name != new_short;
        let display_changed = record.display_name != edit.display_name;

        if (short_changed || display_changed) && record.status.is_busy() {
            return Err(KiraError::Validation(format!(
                "reference {} is {}; rename it once the job finishes",
                record.short_name, record.status
            )));
        }
        if short_changed {
            let taken = self
                .catalog
                .find_by_short_name(new_short.as_str())?
                .into_iter()
                .any(|other| other.id != id && other.index_version == record.index_version);
            if taken {
                return Err(KiraError::Validation(format!(
                    "a reference named {new_short} already exists for index version {}",
                    record.index_version
                )));
            }
        }

        if short_changed || display_changed {
            match rename_reference(&record, &new_short, &edit.display_name) {
                Ok(new_path) => {
                    record.reference_path = new_path;
                    record.name_mismatch = false;
                }
                Err(KiraError::Rename { message, partial }) => {
                    if partial {
                        warn!(id = %id, "rename left disk and catalog out of step: {message}");
                        record.name_mismatch = true;
                        record.verbose_error = Some(vec![format!("rename failed: {message}")]);
                        self.catalog.save_reference(&record)?;
                    }
                    return Err(KiraError::Rename { message, partial });
                }
                Err(err) => return Err(err),
            }
            record.short_name = new_short;
            record.display_name = edit.display_name;
        }

        if let Some(notes) = edit.notes {
            record.notes = notes;
        }
        record.enabled = edit.enabled;
        let saved = self.catalog.save_reference(&record)?;
        info!(id = %saved.id, short_name = %saved.short_name, "reference edited");
        Ok(saved)
    }

    pub fn delete_reference(&self, id: ReferenceId) -> Result<DeleteResult, KiraError> {
        let record = self.catalog.get_reference(id)?;
        Store::remove_reference_tree(&record.reference_path).map_err(|err| {
            KiraError::Filesystem(format!(
                "genome could not be deleted; check the file permissions at {}: {err}",
                record.reference_path
            ))
        })?;
        self.catalog.delete_reference(id)?;
        info!(id = %id, short_name = %record.short_name, "reference deleted");
        Ok(DeleteResult {
            id,
            removed_path: record.reference_path,
        })
    }

    pub fn reset_reference(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError> {
        let mut record = self.catalog.get_reference(id)?;
        if !record.status.is_busy() {
            return Err(KiraError::Validation(format!(
                "reference {} is {}; only references with a pending job can be reset",
                record.short_name, record.status
            )));
        }
        let previous = record.status;
        record.fail(format!("reset by administrator while {previous}"))?;
        let saved = self.catalog.save_reference(&record)?;
        warn!(id = %id, from = %previous, "reference reset to error");
        Ok(saved)
    }
}
