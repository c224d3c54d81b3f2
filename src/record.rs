use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MonitorId, ReferenceId, ReferenceStatus, ShortName};
use crate::error::KiraError;
use crate::jobs::JobHandle;

const VALIDATION_HEADER: &str = "FASTA file failed validation. Please review the error below and modify the FASTA file to correct the problem.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: ReferenceId,
    pub short_name: ShortName,
    pub display_name: String,
    pub version: String,
    pub index_version: String,
    pub status: ReferenceStatus,
    pub reference_path: Utf8PathBuf,
    #[serde(default)]
    pub identity_hash: Option<String>,
    #[serde(default)]
    pub verbose_error: Option<Vec<String>>,
    pub enabled: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub job_handle: Option<JobHandle>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub file_monitor: Option<MonitorId>,
    #[serde(default)]
    pub name_mismatch: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct NewReference {
    pub short_name: ShortName,
    pub display_name: String,
    pub version: String,
    pub index_version: String,
    pub status: ReferenceStatus,
    pub reference_path: Utf8PathBuf,
    pub enabled: bool,
    pub notes: String,
    pub identity_hash: Option<String>,
    pub source: Option<String>,
}

impl ReferenceRecord {
    pub fn from_new(id: ReferenceId, new: NewReference) -> Self {
        let now = Utc::now();
        Self {
            id,
            short_name: new.short_name,
            display_name: new.display_name,
            version: new.version,
            index_version: new.index_version,
            status: new.status,
            reference_path: new.reference_path,
            identity_hash: new.identity_hash,
            verbose_error: None,
            enabled: new.enabled,
            source: new.source,
            job_handle: None,
            notes: new.notes,
            file_monitor: None,
            name_mismatch: false,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn transition(&mut self, next: ReferenceStatus) -> Result<(), KiraError> {
        if !self.status.can_transition_to(next) {
            return Err(KiraError::IllegalTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), KiraError> {
        self.transition(ReferenceStatus::Error)?;
        self.verbose_error = Some(vec![detail.into()]);
        self.job_handle = None;
        Ok(())
    }

    pub fn is_stale(&self, toolchain_version: &str) -> bool {
        self.index_version != toolchain_version
    }

    pub fn sidecar_path(&self) -> Utf8PathBuf {
        self.reference_path
            .join(format!("{}.info.txt", self.short_name))
    }

    pub fn fasta_path(&self) -> Utf8PathBuf {
        self.reference_path.join(format!("{}.fasta", self.short_name))
    }

    pub fn error_summary(&self) -> Option<Vec<String>> {
        let entries = self.verbose_error.as_ref()?;
        if entries.len() <= 2 {
            return Some(entries.clone());
        }
        let trimmed = entries[1..entries.len() - 1].to_vec();
        let first = &trimmed[0];
        if !first.contains("validate_reference") {
            return Some(trimmed);
        }
        let blocks = first.split("\n\n").collect::<Vec<_>>();
        if blocks.len() < 3 {
            return Some(trimmed);
        }
        let Some((_, detail)) = blocks[blocks.len() - 2].split_once(": ") else {
            return Some(trimmed);
        };
        Some(vec![
            VALIDATION_HEADER.to_string(),
            detail.to_string(),
            blocks[1].to_string(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMonitor {
    pub id: MonitorId,
    #[serde(default)]
    pub local_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl FileMonitor {
    pub fn for_upload(local_dir: Utf8PathBuf, name: &str) -> Self {
        Self {
            id: MonitorId(0),
            local_dir: Some(local_dir),
            name: Some(name.to_string()),
            url: None,
            tags: String::new(),
            status: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn for_download(url: &str) -> Self {
        Self {
            id: MonitorId(0),
            local_dir: None,
            name: None,
            url: Some(url.to_string()),
            tags: "reference".to_string(),
            status: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn mark_system_error(&mut self, detail: &str) {
        self.status = format!("System Error: {detail}");
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record(status: ReferenceStatus) -> ReferenceRecord {
        ReferenceRecord::from_new(
            ReferenceId(7),
            NewReference {
                short_name: "hg19".parse().unwrap(),
                display_name: "Homo sapiens".to_string(),
                version: "hg19".to_string(),
                index_version: "tmap-f3".to_string(),
                status,
                reference_path: Utf8PathBuf::from("/lib/tmap-f3/hg19"),
                enabled: true,
                notes: String::new(),
                identity_hash: None,
                source: None,
            },
        )
    }

    #[test]
    fn rejects_transition_outside_lifecycle() {
        let mut rec = record(ReferenceStatus::Preprocessing);
        let err = rec.transition(ReferenceStatus::Complete).unwrap_err();
        assert_matches!(
            err,
            KiraError::IllegalTransition {
                from: ReferenceStatus::Preprocessing,
                to: ReferenceStatus::Complete,
                ..
            }
        );
        assert_eq!(rec.status, ReferenceStatus::Preprocessing);
    }

    #[test]
    fn fail_records_detail_and_clears_job() {
        let mut rec = record(ReferenceStatus::Queued);
        rec.job_handle = Some(JobHandle::new("job-1"));
        rec.fail("boom").unwrap();
        assert_eq!(rec.status, ReferenceStatus::Error);
        assert_eq!(rec.verbose_error, Some(vec!["boom".to_string()]));
        assert!(rec.job_handle.is_none());
    }

    #[test]
    fn member_paths_use_short_name_prefix() {
        let rec = record(ReferenceStatus::Complete);
        assert_eq!(rec.sidecar_path(), "/lib/tmap-f3/hg19/hg19.info.txt");
        assert_eq!(rec.fasta_path(), "/lib/tmap-f3/hg19/hg19.fasta");
    }

    #[test]
    fn summary_trims_wrapper_entries() {
        let mut rec = record(ReferenceStatus::Error);
        rec.verbose_error = Some(vec![
            "Traceback".to_string(),
            "index build exited with 1".to_string(),
            "end".to_string(),
        ]);
        assert_eq!(
            rec.error_summary(),
            Some(vec!["index build exited with 1".to_string()])
        );
    }

    #[test]
    fn summary_highlights_fasta_validation() {
        let mut rec = record(ReferenceStatus::Error);
        rec.verbose_error = Some(vec![
            "start".to_string(),
            "validate_reference failed\n\n>chr1 bad header\n\nERROR: duplicate contig name\n\ndone"
                .to_string(),
            "end".to_string(),
        ]);
        let summary = rec.error_summary().unwrap();
        assert_eq!(summary[0], VALIDATION_HEADER);
        assert_eq!(summary[1], "duplicate contig name");
        assert_eq!(summary[2], ">chr1 bad header");
    }
}
