use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;
use crate::store::Store;

pub const CONFIG_FILE: &str = "kira-reflib.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub library_root: Utf8PathBuf,
    #[serde(default)]
    pub temp_root: Option<Utf8PathBuf>,
    pub index_version: String,
    #[serde(default)]
    pub partition_prefix: Option<String>,
    #[serde(default)]
    pub catalog_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub scheduler_url: Option<String>,
    #[serde(default)]
    pub reference_list_url: Option<String>,
    #[serde(default)]
    pub dispatch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub feed_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub library_root: Utf8PathBuf,
    pub temp_root: Utf8PathBuf,
    pub index_version: String,
    pub partition_prefix: String,
    pub catalog_path: Utf8PathBuf,
    pub scheduler_url: Option<String>,
    pub reference_list_url: Option<String>,
    pub dispatch_timeout: Duration,
    pub feed_timeout: Duration,
}

impl LibraryConfig {
    pub fn store(&self) -> Store {
        Store::new(self.library_root.clone(), self.temp_root.clone())
    }

    pub fn for_roots(
        library_root: Utf8PathBuf,
        temp_root: Utf8PathBuf,
        index_version: &str,
    ) -> Self {
        let catalog_path = library_root.join("catalog.json");
        Self {
            library_root,
            temp_root,
            index_version: index_version.to_string(),
            partition_prefix: default_partition_prefix(),
            catalog_path,
            scheduler_url: None,
            reference_list_url: None,
            dispatch_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            feed_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<LibraryConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => default_config_path().ok_or(KiraError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<LibraryConfig, KiraError> {
        if config.index_version.trim().is_empty() {
            return Err(KiraError::ConfigParse(
                "index_version must not be empty".to_string(),
            ));
        }
        let temp_root = config
            .temp_root
            .unwrap_or_else(|| config.library_root.join("temp"));
        let catalog_path = match config.catalog_path {
            Some(path) => path,
            None => default_catalog_path()?,
        };

        Ok(LibraryConfig {
            library_root: config.library_root,
            temp_root,
            index_version: config.index_version,
            partition_prefix: config
                .partition_prefix
                .unwrap_or_else(default_partition_prefix),
            catalog_path,
            scheduler_url: config.scheduler_url,
            reference_list_url: config.reference_list_url,
            dispatch_timeout: Duration::from_secs(
                config.dispatch_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            feed_timeout: Duration::from_secs(
                config.feed_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }
}

pub fn default_partition_prefix() -> String {
    "tmap".to_string()
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "kira-reflib")
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.json"))
        .filter(|path| path.exists())
}

fn default_catalog_path() -> Result<Utf8PathBuf, KiraError> {
    project_dirs()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("catalog.json")).ok())
        .ok_or_else(|| KiraError::Filesystem("unable to resolve data directory".to_string()))
}
