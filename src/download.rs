use serde::Serialize;
use tracing::info;

use crate::app::App;
use crate::catalog::RecordStore;
use crate::domain::{ReferenceId, ReferenceStatus, ShortName};
use crate::error::KiraError;
use crate::feed::{CatalogFeed, FeedEntry};
use crate::ingest::IngestOutcome;
use crate::jobs::{JobRequest, JobTask, Scheduler};
use crate::record::{FileMonitor, NewReference};

#[derive(Debug, Clone, Serialize)]
pub struct AvailableReference {
    #[serde(flatten)]
    pub entry: FeedEntry,
    pub installed: Option<ReferenceId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableReferences {
    pub reachable: bool,
    pub references: Vec<AvailableReference>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomDownload {
    pub url: String,
    pub short_name: String,
    pub display_name: String,
    pub version: String,
    pub notes: String,
}

impl<C: RecordStore, S: Scheduler, F: CatalogFeed> App<C, S, F> {
    pub fn available_references(&self) -> Result<AvailableReferences, KiraError> {
        let Some(entries) = self.feed.fetch_available()? else {
            return Ok(AvailableReferences {
                reachable: false,
                references: Vec::new(),
            });
        };
        let hashes = entries
            .iter()
            .map(|entry| entry.meta.identity_hash.clone())
            .collect::<Vec<_>>();
        let installed = self.catalog.find_by_identity_hashes(&hashes)?;

        let references = entries
            .into_iter()
            .map(|entry| {
                let installed = installed
                    .iter()
                    .find(|record| {
                        record.identity_hash.as_deref() == Some(entry.meta.identity_hash.as_str())
                    })
                    .map(|record| record.id);
                AvailableReference { entry, installed }
            })
            .collect();
        Ok(AvailableReferences {
            reachable: true,
            references,
        })
    }

    pub fn install_from_feed(&self, entry: &FeedEntry) -> Result<IngestOutcome, KiraError> {
        let short_name: ShortName = entry.meta.short_name.parse()?;
        let new = NewReference {
            short_name,
            display_name: entry.meta.name.clone(),
            version: entry.meta.version.clone(),
            index_version: entry.meta.index_version.clone(),
            status: ReferenceStatus::Preprocessing,
            reference_path: Default::default(),
            enabled: entry.meta.enabled.unwrap_or(true),
            notes: entry.meta.notes.clone(),
            identity_hash: Some(entry.meta.identity_hash.clone()),
            source: Some(entry.url.clone()),
        };
        self.start_download(new, &entry.url)
    }

    pub fn install_custom(&self, download: CustomDownload) -> Result<IngestOutcome, KiraError> {
        if download.url.trim().is_empty() {
            return Err(KiraError::Validation("a download URL is required".to_string()));
        }
        let short_name: ShortName = download.short_name.trim().parse()?;
        let url = download.url.trim().to_string();
        let new = NewReference {
            short_name,
            display_name: download.display_name,
            version: download.version,
            index_version: String::new(),
            status: ReferenceStatus::Preprocessing,
            reference_path: Default::default(),
            enabled: false,
            notes: download.notes,
            identity_hash: None,
            source: Some(url.clone()),
        };
        self.start_download(new, &url)
    }

    fn start_download(&self, new: NewReference, url: &str) -> Result<IngestOutcome, KiraError> {
        let mut record = self.catalog.insert_reference(new)?;
        let monitor = self.catalog.insert_monitor(FileMonitor::for_download(url))?;
        record.file_monitor = Some(monitor.id);
        let record = self.catalog.save_reference(&record)?;
        info!(id = %record.id, url, "registered download");

        let chain = JobRequest::new(JobTask::Download {
            url: url.to_string(),
            monitor_id: monitor.id,
            temp_dir: self.store.temp_root().to_path_buf(),
        })
        .then(JobTask::InstallReference {
            reference_id: record.id,
        });
        self.hand_off(record, monitor, &chain)
    }
}
