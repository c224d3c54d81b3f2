use std::fs;
use std::io;

use camino::{Utf8Component, Utf8Path};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::catalog::RecordStore;
use crate::domain::{ReferenceStatus, ShortName};
use crate::error::KiraError;
use crate::feed::CatalogFeed;
use crate::fs_util::{archive_members, fasta_members, is_fasta_name, is_zip_archive};
use crate::jobs::{JobHandle, JobRequest, JobTask, Scheduler};
use crate::record::{FileMonitor, NewReference, ReferenceRecord};
use crate::store::file_size;

const UNDELETED_SUFFIX: &str = " The FASTA file could not be deleted.";

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub short_name: String,
    pub display_name: String,
    pub upload_name: String,
    pub reported_size: Option<u64>,
    pub version: String,
    pub notes: String,
    pub url: Option<String>,
}

impl UploadRequest {
    fn is_remote(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub reference: ReferenceRecord,
    pub monitor: FileMonitor,
    pub job_handle: Option<JobHandle>,
    pub dispatch_error: Option<String>,
}

#[derive(Debug)]
struct CheckedUpload {
    short_name: ShortName,
    archive_member: Option<String>,
}

impl<C: RecordStore, S: Scheduler, F: CatalogFeed> App<C, S, F> {
    pub fn ingest_upload(&self, request: UploadRequest) -> Result<IngestOutcome, KiraError> {
        let upload = self.store.upload_path(&request.upload_name);
        let checked = match self.validate_upload(&request, &upload) {
            Ok(checked) => checked,
            Err(reason) => {
                let mut message = reason;
                if is_plain_file_name(&request.upload_name) && !discard_upload(&upload) {
                    message.push_str(UNDELETED_SUFFIX);
                }
                warn!(upload = %upload, "rejected upload: {message}");
                return Err(KiraError::Validation(message));
            }
        };

        let record = self.catalog.insert_reference(NewReference {
            short_name: checked.short_name.clone(),
            display_name: request.display_name.trim().to_string(),
            version: request.version.clone(),
            index_version: self.config.index_version.clone(),
            status: ReferenceStatus::Preprocessing,
            reference_path: upload.clone(),
            enabled: false,
            notes: request.notes.clone(),
            identity_hash: None,
            source: request.url.clone(),
        })?;
        info!(id = %record.id, short_name = %record.short_name, "registered upload");

        let (record, monitor) = match self.stage_upload(record.clone(), &upload, &request) {
            Ok(staged) => staged,
            Err(err) => {
                let mut failed = record;
                failed.fail(format!("could not stage upload: {err}"))?;
                self.catalog.save_reference(&failed)?;
                return Err(err);
            }
        };

        let chain = match &checked.archive_member {
            Some(member) => JobRequest::new(JobTask::UnzipReference {
                reference_id: record.id,
                member: member.clone(),
            }),
            None => JobRequest::new(JobTask::CopyReference {
                reference_id: record.id,
            }),
        }
        .then(JobTask::BuildIndex {
            reference_id: record.id,
        });

        self.hand_off(record, monitor, &chain)
    }

    fn validate_upload(
        &self,
        request: &UploadRequest,
        upload: &Utf8Path,
    ) -> Result<CheckedUpload, String> {
        let missing = [
            ("short name", request.short_name.as_str()),
            ("name", request.display_name.as_str()),
            ("file", request.upload_name.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}.", missing.join(", ")));
        }
        if !is_plain_file_name(&request.upload_name) {
            return Err(format!(
                "The file {} must be a plain file name inside the upload directory.",
                request.upload_name
            ));
        }

        let short_name = request
            .short_name
            .trim()
            .parse::<ShortName>()
            .map_err(|err| format!("{err}; valid characters are letters, numbers, and underscores."))?;

        let remote = request.is_remote();
        if !remote && file_size(upload).is_none() {
            return Err(format!("The uploaded file {} does not exist.", request.upload_name));
        }

        let archive_member = if is_zip_archive(upload.as_std_path()) {
            let members = archive_members(upload.as_std_path()).map_err(|err| err.to_string())?;
            let fasta = fasta_members(&members);
            if fasta.len() != 1 {
                return Err(format!(
                    "The zip archive must contain exactly one fasta file; found {}.",
                    fasta.len()
                ));
            }
            fasta.into_iter().next()
        } else {
            None
        };

        if !remote {
            if let (Some(expected), Some(actual)) = (request.reported_size, file_size(upload)) {
                if expected != actual {
                    return Err(format!(
                        "The uploaded file is {actual} bytes but {expected} bytes were sent; \
                         the transfer may be corrupt."
                    ));
                }
            }
            let name = request.upload_name.to_lowercase();
            if !(name.ends_with(".fasta") || name.ends_with(".zip")) {
                return Err("The file must have a .fasta or .zip extension.".to_string());
            }
        }
        if archive_member.is_none() && !is_fasta_name(&request.upload_name.to_lowercase()) {
            return Err(format!(
                "{} is neither a zip archive nor a .fa/.fasta file.",
                request.upload_name
            ));
        }

        let taken = self
            .catalog
            .find_by_short_name(short_name.as_str())
            .map_err(|err| err.to_string())?
            .into_iter()
            .any(|record| record.index_version == self.config.index_version);
        if taken {
            return Err(format!(
                "A reference named {short_name} already exists for index version {}.",
                self.config.index_version
            ));
        }

        debug!(short_name = %short_name, member = ?archive_member, "upload passed validation");
        Ok(CheckedUpload {
            short_name,
            archive_member,
        })
    }

    fn stage_upload(
        &self,
        mut record: ReferenceRecord,
        upload: &Utf8Path,
        request: &UploadRequest,
    ) -> Result<(ReferenceRecord, FileMonitor), KiraError> {
        let scratch = self.store.make_scratch_dir(&record.short_name)?;
        let staged = scratch.join(&request.upload_name);
        move_file(upload, &staged)?;

        let monitor = self
            .catalog
            .insert_monitor(FileMonitor::for_upload(scratch, &request.upload_name))?;
        record.file_monitor = Some(monitor.id);
        record.reference_path = staged;
        let record = self.catalog.save_reference(&record)?;
        debug!(id = %record.id, path = %record.reference_path, "upload staged");
        Ok((record, monitor))
    }

    pub(crate) fn hand_off(
        &self,
        mut record: ReferenceRecord,
        mut monitor: FileMonitor,
        chain: &JobRequest,
    ) -> Result<IngestOutcome, KiraError> {
        // Claim first: a worker may call back before dispatch returns.
        record.transition(ReferenceStatus::Queued)?;
        let claimed = self.catalog.save_reference(&record)?;
        match self.scheduler.dispatch(chain) {
            Ok(handle) => {
                let reference = self.attach_job(claimed, &handle)?;
                info!(
                    id = %reference.id,
                    job = %handle,
                    status = %reference.status,
                    "reference queued"
                );
                Ok(IngestOutcome {
                    reference,
                    monitor,
                    job_handle: Some(handle),
                    dispatch_error: None,
                })
            }
            Err(err) => {
                let detail = err.to_string();
                error!(id = %claimed.id, "job dispatch failed: {detail}");
                let mut failed = claimed;
                failed.fail(detail.clone())?;
                let reference = self.catalog.save_reference(&failed)?;
                monitor.mark_system_error(&detail);
                self.catalog.save_monitor(&monitor)?;
                Ok(IngestOutcome {
                    reference,
                    monitor,
                    job_handle: None,
                    dispatch_error: Some(detail),
                })
            }
        }
    }

    pub(crate) fn attach_job(
        &self,
        mut record: ReferenceRecord,
        handle: &JobHandle,
    ) -> Result<ReferenceRecord, KiraError> {
        loop {
            if record.status.is_terminal() {
                return Ok(record);
            }
            record.job_handle = Some(handle.clone());
            match self.catalog.save_reference(&record) {
                Ok(saved) => return Ok(saved),
                Err(KiraError::Conflict { id, message }) => {
                    let latest = self.catalog.get_reference(id)?;
                    if latest.revision == record.revision {
                        return Err(KiraError::Conflict { id, message });
                    }
                    debug!(id = %id, revision = latest.revision, "record moved on before attach");
                    record = latest;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Utf8Path::new(name).components();
    !name.contains(['/', '\\'])
        && matches!(components.next(), Some(Utf8Component::Normal(_)))
        && components.next().is_none()
}

fn discard_upload(upload: &Utf8Path) -> bool {
    match fs::remove_file(upload.as_std_path()) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!(upload = %upload, error = %err, "could not delete rejected upload");
            false
        }
    }
}

fn move_file(from: &Utf8Path, to: &Utf8Path) -> Result<(), KiraError> {
    if fs::rename(from.as_std_path(), to.as_std_path()).is_ok() {
        return Ok(());
    }
    // Temp root and scratch may sit on different mounts.
    fs::copy(from.as_std_path(), to.as_std_path())
        .and_then(|_| fs::remove_file(from.as_std_path()))
        .map_err(|err| KiraError::Filesystem(format!("move {from} to {to}: {err}")))
}
