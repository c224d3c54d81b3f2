use serde::Serialize;
use tracing::{info, warn};

use crate::app::App;
use crate::catalog::RecordStore;
use crate::domain::{ReferenceId, ReferenceStatus};
use crate::error::KiraError;
use crate::feed::CatalogFeed;
use crate::jobs::{JobRequest, JobTask, Scheduler};
use crate::record::ReferenceRecord;

#[derive(Debug, Clone, Serialize)]
pub struct RebuildFailure {
    pub id: ReferenceId,
    pub short_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub rebuilt: Vec<ReferenceRecord>,
    pub failed: Vec<RebuildFailure>,
}

impl<C: RecordStore, S: Scheduler, F: CatalogFeed> App<C, S, F> {
    pub fn rebuild_index(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError> {
        let record = self.catalog.get_reference(id)?;
        self.rebuild_record(record)
    }

    pub fn rebuild_stale(&self) -> Result<RebuildReport, KiraError> {
        let mut report = RebuildReport::default();
        let stale = self
            .catalog
            .references()?
            .into_iter()
            .filter(|record| record.status == ReferenceStatus::Complete)
            .filter(|record| record.is_stale(&self.config.index_version));
        for record in stale {
            let (id, short_name) = (record.id, record.short_name.to_string());
            match self.rebuild_record(record) {
                Ok(rebuilt) => report.rebuilt.push(rebuilt),
                Err(err) => {
                    warn!(id = %id, "rebuild failed: {err}");
                    report.failed.push(RebuildFailure {
                        id,
                        short_name,
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            "stale index rebuild finished"
        );
        Ok(report)
    }

    fn rebuild_record(&self, mut record: ReferenceRecord) -> Result<ReferenceRecord, KiraError> {
        if record.status != ReferenceStatus::Complete {
            return Err(KiraError::Validation(format!(
                "reference {} is {}; only complete references can be rebuilt",
                record.short_name, record.status
            )));
        }
        if !record.is_stale(&self.config.index_version) {
            return Err(KiraError::Validation(format!(
                "reference {} is already indexed with {}",
                record.short_name, self.config.index_version
            )));
        }

        record.transition(ReferenceStatus::Indexing)?;
        record.verbose_error = None;
        let mut claimed = self.catalog.save_reference(&record)?;

        let chain = JobRequest::new(JobTask::BuildIndex {
            reference_id: claimed.id,
        });
        match self.scheduler.dispatch(&chain) {
            Ok(handle) => {
                let saved = self.attach_job(claimed, &handle)?;
                info!(id = %saved.id, job = %handle, "index rebuild dispatched");
                Ok(saved)
            }
            Err(err) => {
                claimed.fail(format!("index rebuild could not be dispatched: {err}"))?;
                self.catalog.save_reference(&claimed)?;
                Err(err)
            }
        }
    }
}
