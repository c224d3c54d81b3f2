use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{MonitorId, ReferenceId, compare_versions};
use crate::error::KiraError;
use crate::record::{FileMonitor, NewReference, ReferenceRecord};
use crate::store::Store;

pub trait RecordStore: Send + Sync {
    fn insert_reference(&self, new: NewReference) -> Result<ReferenceRecord, KiraError>;

    fn get_reference(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError>;

    /// Compare-and-set on `revision`: succeeds only if the stored record still
    /// carries the revision the caller read. Returns the saved record with its
    /// bumped revision.
    fn save_reference(&self, record: &ReferenceRecord) -> Result<ReferenceRecord, KiraError>;

    fn delete_reference(&self, id: ReferenceId) -> Result<(), KiraError>;

    fn references(&self) -> Result<Vec<ReferenceRecord>, KiraError>;

    fn insert_monitor(&self, monitor: FileMonitor) -> Result<FileMonitor, KiraError>;

    fn get_monitor(&self, id: MonitorId) -> Result<FileMonitor, KiraError>;

    fn save_monitor(&self, monitor: &FileMonitor) -> Result<(), KiraError>;

    fn monitors(&self) -> Result<Vec<FileMonitor>, KiraError>;

    fn find_by_short_name(&self, short_name: &str) -> Result<Vec<ReferenceRecord>, KiraError> {
        Ok(self
            .references()?
            .into_iter()
            .filter(|record| record.short_name == *short_name)
            .collect())
    }

    fn latest_by_short_name(
        &self,
        short_name: &str,
    ) -> Result<Option<ReferenceRecord>, KiraError> {
        Ok(self
            .find_by_short_name(short_name)?
            .into_iter()
            .max_by(|a, b| {
                compare_versions(&a.index_version, &b.index_version).then(a.id.cmp(&b.id))
            }))
    }

    fn find_by_identity_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<ReferenceRecord>, KiraError> {
        Ok(self
            .references()?
            .into_iter()
            .filter(|record| {
                record
                    .identity_hash
                    .as_ref()
                    .map(|hash| hashes.contains(hash))
                    .unwrap_or(false)
            })
            .collect())
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn insert_reference(&self, new: NewReference) -> Result<ReferenceRecord, KiraError> {
        (**self).insert_reference(new)
    }

    fn get_reference(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError> {
        (**self).get_reference(id)
    }

    fn save_reference(&self, record: &ReferenceRecord) -> Result<ReferenceRecord, KiraError> {
        (**self).save_reference(record)
    }

    fn delete_reference(&self, id: ReferenceId) -> Result<(), KiraError> {
        (**self).delete_reference(id)
    }

    fn references(&self) -> Result<Vec<ReferenceRecord>, KiraError> {
        (**self).references()
    }

    fn insert_monitor(&self, monitor: FileMonitor) -> Result<FileMonitor, KiraError> {
        (**self).insert_monitor(monitor)
    }

    fn get_monitor(&self, id: MonitorId) -> Result<FileMonitor, KiraError> {
        (**self).get_monitor(id)
    }

    fn save_monitor(&self, monitor: &FileMonitor) -> Result<(), KiraError> {
        (**self).save_monitor(monitor)
    }

    fn monitors(&self) -> Result<Vec<FileMonitor>, KiraError> {
        (**self).monitors()
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    next_reference_id: u64,
    next_monitor_id: u64,
    references: BTreeMap<ReferenceId, ReferenceRecord>,
    monitors: BTreeMap<MonitorId, FileMonitor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    next_reference_id: u64,
    next_monitor_id: u64,
    references: Vec<ReferenceRecord>,
    monitors: Vec<FileMonitor>,
}

pub struct Catalog {
    path: Option<Utf8PathBuf>,
    state: Mutex<CatalogState>,
}

impl Catalog {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(CatalogState::default()),
        }
    }

    pub fn open(path: &Utf8Path) -> Result<Self, KiraError> {
        let state = if path.as_std_path().exists() {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("read {path}: {err}")))?;
            let file: CatalogFile = serde_json::from_str(&content)
                .map_err(|err| KiraError::CatalogPersist(format!("{path}: {err}")))?;
            CatalogState {
                next_reference_id: file.next_reference_id,
                next_monitor_id: file.next_monitor_id,
                references: file
                    .references
                    .into_iter()
                    .map(|record| (record.id, record))
                    .collect(),
                monitors: file
                    .monitors
                    .into_iter()
                    .map(|monitor| (monitor.id, monitor))
                    .collect(),
            }
        } else {
            CatalogState::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>, KiraError> {
        self.state
            .lock()
            .map_err(|_| KiraError::CatalogPersist("catalog lock poisoned".to_string()))
    }

    fn commit<T>(
        &self,
        apply: impl FnOnce(&mut CatalogState) -> Result<T, KiraError>,
    ) -> Result<T, KiraError> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let value = apply(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(value)
    }

    fn persist(&self, state: &CatalogState) -> Result<(), KiraError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CatalogFile {
            next_reference_id: state.next_reference_id,
            next_monitor_id: state.next_monitor_id,
            references: state.references.values().cloned().collect(),
            monitors: state.monitors.values().cloned().collect(),
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|err| KiraError::CatalogPersist(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }
}

impl RecordStore for Catalog {
    fn insert_reference(&self, new: NewReference) -> Result<ReferenceRecord, KiraError> {
        self.commit(|state| {
            ensure_unique_name(state, None, new.short_name.as_str(), &new.index_version)?;
            state.next_reference_id += 1;
            let mut record = ReferenceRecord::from_new(ReferenceId(state.next_reference_id), new);
            record.revision = 1;
            state.references.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn get_reference(&self, id: ReferenceId) -> Result<ReferenceRecord, KiraError> {
        self.lock()?
            .references
            .get(&id)
            .cloned()
            .ok_or(KiraError::ReferenceNotFound(id))
    }

    fn save_reference(&self, record: &ReferenceRecord) -> Result<ReferenceRecord, KiraError> {
        self.commit(|state| {
            let stored = state
                .references
                .get(&record.id)
                .ok_or(KiraError::ReferenceNotFound(record.id))?;
            if stored.revision != record.revision {
                return Err(KiraError::Conflict {
                    id: record.id,
                    message: format!(
                        "expected revision {}, found {}",
                        record.revision, stored.revision
                    ),
                });
            }
            if let Some(handle) = &record.job_handle {
                let holder = state.references.values().find(|other| {
                    other.id != record.id && other.job_handle.as_ref() == Some(handle)
                });
                if let Some(holder) = holder {
                    return Err(KiraError::Conflict {
                        id: record.id,
                        message: format!("job {handle} already belongs to reference {}", holder.id),
                    });
                }
            }
            ensure_unique_name(
                state,
                Some(record.id),
                record.short_name.as_str(),
                &record.index_version,
            )?;
            let mut saved = record.clone();
            saved.revision += 1;
            saved.updated_at = Utc::now();
            state.references.insert(saved.id, saved.clone());
            Ok(saved)
        })
    }

    fn delete_reference(&self, id: ReferenceId) -> Result<(), KiraError> {
        self.commit(|state| {
            state
                .references
                .remove(&id)
                .ok_or(KiraError::ReferenceNotFound(id))?;
            Ok(())
        })
    }

    fn references(&self) -> Result<Vec<ReferenceRecord>, KiraError> {
        Ok(self.lock()?.references.values().cloned().collect())
    }

    fn insert_monitor(&self, mut monitor: FileMonitor) -> Result<FileMonitor, KiraError> {
        self.commit(|state| {
            state.next_monitor_id += 1;
            monitor.id = MonitorId(state.next_monitor_id);
            state.monitors.insert(monitor.id, monitor.clone());
            Ok(monitor)
        })
    }

    fn get_monitor(&self, id: MonitorId) -> Result<FileMonitor, KiraError> {
        self.lock()?
            .monitors
            .get(&id)
            .cloned()
            .ok_or(KiraError::MonitorNotFound(id.0))
    }

    fn save_monitor(&self, monitor: &FileMonitor) -> Result<(), KiraError> {
        self.commit(|state| {
            if !state.monitors.contains_key(&monitor.id) {
                return Err(KiraError::MonitorNotFound(monitor.id.0));
            }
            state.monitors.insert(monitor.id, monitor.clone());
            Ok(())
        })
    }

    fn monitors(&self) -> Result<Vec<FileMonitor>, KiraError> {
        Ok(self.lock()?.monitors.values().cloned().collect())
    }
}

fn ensure_unique_name(
    state: &CatalogState,
    id: Option<ReferenceId>,
    short_name: &str,
    index_version: &str,
) -> Result<(), KiraError> {
    let holder = state.references.values().find(|other| {
        Some(other.id) != id
            && other.short_name == *short_name
            && other.index_version == index_version
    });
    match holder {
        Some(holder) => Err(KiraError::Validation(format!(
            "a reference named {short_name} already exists for index version {index_version:?} \
             (reference {})",
            holder.id
        ))),
        None => Ok(()),
    }
}
