use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::App;
use crate::catalog::RecordStore;
use crate::domain::{ReferenceId, ReferenceStatus};
use crate::error::KiraError;
use crate::feed::CatalogFeed;
use crate::jobs::{JobHandle, Scheduler};
use crate::record::ReferenceRecord;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportStatus {
    pub reference_id: ReferenceId,
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub verbose_error: Option<String>,
    #[serde(default)]
    pub index_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusAck {
    pub reference_id: ReferenceId,
    pub status: ReferenceStatus,
    pub revision: u64,
    pub job_handle: Option<JobHandle>,
}

impl<C: RecordStore, S: Scheduler, F: CatalogFeed> App<C, S, F> {
    pub fn report_status(&self, report: ReportStatus) -> Result<StatusAck, KiraError> {
        let status = parse_status(report.status.as_deref())?;
        let mut record = self.catalog.get_reference(report.reference_id)?;
        if let Some(revision) = report.revision {
            if revision != record.revision {
                return Err(KiraError::Conflict {
                    id: record.id,
                    message: format!(
                        "callback for revision {revision}, record is at {}",
                        record.revision
                    ),
                });
            }
        }

        if record.status != status {
            record.transition(status)?;
        }
        record.enabled = report.enabled.unwrap_or(false);
        record.verbose_error = parse_verbose_error(report.verbose_error.as_deref());
        if let Some(index_version) = report.index_version {
            record.index_version = index_version;
        }
        record.reference_path = self
            .store
            .reference_dir(&record.index_version, &record.short_name);
        if status.is_terminal() {
            record.job_handle = None;
        }

        let saved = self.catalog.save_reference(&record)?;
        info!(id = %saved.id, status = %saved.status, "status reported");
        Ok(StatusAck::from_record(&saved))
    }

    pub fn status_of(&self, id: ReferenceId) -> Result<StatusAck, KiraError> {
        Ok(StatusAck::from_record(&self.catalog.get_reference(id)?))
    }
}

impl StatusAck {
    fn from_record(record: &ReferenceRecord) -> Self {
        Self {
            reference_id: record.id,
            status: record.status,
            revision: record.revision,
            job_handle: record.job_handle.clone(),
        }
    }
}

fn parse_status(value: Option<&str>) -> Result<ReferenceStatus, KiraError> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| KiraError::MalformedCallback("no status given".to_string()))?;
    value
        .parse()
        .map_err(|_| KiraError::MalformedCallback(format!("unknown status {value:?}")))
}

fn parse_verbose_error(value: Option<&str>) -> Option<Vec<String>> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(lines) if lines.is_empty() => None,
        Ok(lines) => Some(lines),
        Err(_) => {
            debug!("verbose_error is not a JSON list; keeping it as one entry");
            Some(vec![raw.to_string()])
        }
    }
}
