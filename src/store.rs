use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::ShortName;
use crate::error::KiraError;

#[derive(Debug, Clone)]
pub struct Store {
    library_root: Utf8PathBuf,
    temp_root: Utf8PathBuf,
}

impl Store {
    pub fn new(library_root: Utf8PathBuf, temp_root: Utf8PathBuf) -> Self {
        Self {
            library_root,
            temp_root,
        }
    }

    pub fn library_root(&self) -> &Utf8Path {
        &self.library_root
    }

    pub fn temp_root(&self) -> &Utf8Path {
        &self.temp_root
    }

    pub fn partition_dir(&self, index_version: &str) -> Utf8PathBuf {
        self.library_root.join(index_version)
    }

    pub fn reference_dir(&self, index_version: &str, short_name: &ShortName) -> Utf8PathBuf {
        self.partition_dir(index_version).join(short_name.as_str())
    }

    pub fn upload_path(&self, upload_name: &str) -> Utf8PathBuf {
        self.temp_root.join(upload_name)
    }

    pub fn ensure_temp_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.temp_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn partitions(&self, prefix: &str) -> Result<Vec<Utf8PathBuf>, KiraError> {
        let prefix = prefix.to_lowercase();
        let mut out = subdirectories(&self.library_root)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_lowercase().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        out.sort();
        Ok(out)
    }

    pub fn candidates(&self, partition: &Utf8Path) -> Result<Vec<Utf8PathBuf>, KiraError> {
        let mut out = subdirectories(partition)?;
        out.sort();
        Ok(out)
    }

    pub fn make_scratch_dir(&self, short_name: &ShortName) -> Result<Utf8PathBuf, KiraError> {
        self.ensure_temp_root()?;
        let dir = Builder::new()
            .prefix("kira-reflib-")
            .suffix(short_name.as_str())
            .tempdir_in(self.temp_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?
            .keep();
        let dir = Utf8PathBuf::from_path_buf(dir)
            .map_err(|_| KiraError::Filesystem("non-utf8 scratch directory".to_string()))?;
        open_permissions(&dir)?;
        Ok(dir)
    }

    pub fn remove_reference_tree(path: &Utf8Path) -> Result<(), KiraError> {
        let std_path = path.as_std_path();
        let result = if std_path.is_dir() {
            fs::remove_dir_all(std_path)
        } else if std_path.exists() {
            fs::remove_file(std_path)
        } else {
            return Ok(());
        };
        result.map_err(|err| KiraError::Filesystem(format!("remove {path}: {err}")))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("kira-reflib-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn file_size(path: &Utf8Path) -> Option<u64> {
    fs::metadata(path.as_std_path())
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

fn subdirectories(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, KiraError> {
    let entries = fs::read_dir(root.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("read {root}: {err}")))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => out.push(path),
            Err(path) => {
                tracing::warn!(path = %path.display(), "skipping non-utf8 directory");
            }
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn open_permissions(dir: &Utf8Path) -> Result<(), KiraError> {
    use std::os::unix::fs::PermissionsExt;
    // Workers run under a different account and must be able to write here.
    fs::set_permissions(dir.as_std_path(), fs::Permissions::from_mode(0o777))
        .map_err(|err| KiraError::Filesystem(err.to_string()))
}

#[cfg(not(unix))]
fn open_permissions(_dir: &Utf8Path) -> Result<(), KiraError> {
    Ok(())
}
