use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::KiraError;

pub const GENOME_NAME: &str = "genome_name";
pub const GENOME_VERSION: &str = "genome_version";
pub const INDEX_VERSION: &str = "index_version";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenomeInfo {
    pub genome_name: String,
    pub genome_version: String,
    pub index_version: String,
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarRead {
    Found(GenomeInfo),
    Malformed(String),
    Absent,
}

impl GenomeInfo {
    pub fn new(
        genome_name: impl Into<String>,
        genome_version: impl Into<String>,
        index_version: impl Into<String>,
    ) -> Self {
        Self {
            genome_name: genome_name.into(),
            genome_version: genome_version.into(),
            index_version: index_version.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn read(path: &Utf8Path) -> Option<GenomeInfo> {
        match read_info(path) {
            SidecarRead::Found(info) => Some(info),
            SidecarRead::Malformed(_) | SidecarRead::Absent => None,
        }
    }

    pub fn parse(content: &str) -> Result<GenomeInfo, String> {
        let mut fields = BTreeMap::new();
        for line in content.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let parts = line.split('\t').collect::<Vec<_>>();
            if let [key, value] = parts.as_slice() {
                fields.insert((*key).to_string(), (*value).to_string());
            }
        }
        let mut take = |key: &str| {
            fields
                .remove(key)
                .ok_or_else(|| format!("missing required key {key}"))
        };
        let genome_name = take(GENOME_NAME)?;
        let genome_version = take(GENOME_VERSION)?;
        let index_version = take(INDEX_VERSION)?;
        Ok(GenomeInfo {
            genome_name,
            genome_version,
            index_version,
            extra: fields,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let required = [
            (GENOME_NAME, &self.genome_name),
            (GENOME_VERSION, &self.genome_version),
            (INDEX_VERSION, &self.index_version),
        ];
        let pairs = required
            .into_iter()
            .chain(self.extra.iter().map(|(key, value)| (key.as_str(), value)));
        for (key, value) in pairs {
            let _ = writeln!(out, "{key}\t{value}");
        }
        out
    }
}

pub fn read_info(path: &Utf8Path) -> SidecarRead {
    let bytes = match fs::read(path.as_std_path()) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            error!(path = %path, "could not read genome info file: not found");
            return SidecarRead::Absent;
        }
        Err(err) => {
            warn!(path = %path, error = %err, "genome info file unreadable");
            return SidecarRead::Malformed(err.to_string());
        }
    };
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            warn!(path = %path, "genome info file is not valid UTF-8");
            return SidecarRead::Malformed("not valid UTF-8".to_string());
        }
    };
    match GenomeInfo::parse(&content) {
        Ok(info) => SidecarRead::Found(info),
        Err(reason) => {
            warn!(path = %path, reason = %reason, "genome info file malformed");
            SidecarRead::Malformed(reason)
        }
    }
}

pub fn write_info(path: &Utf8Path, info: &GenomeInfo) -> Result<(), KiraError> {
    let values = [&info.genome_name, &info.genome_version, &info.index_version];
    if values
        .into_iter()
        .chain(info.extra.values())
        .any(|value| value.contains(['\t', '\n']))
    {
        warn!(path = %path, "genome info value contains a tab or newline; written verbatim");
    }
    fs::write(path.as_std_path(), info.render())
        .map_err(|err| KiraError::Filesystem(format!("write {path}: {err}")))
}

pub fn rewrite_genome_name(path: &Utf8Path, new: &str) -> Result<(), KiraError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("read {path}: {err}")))?;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if line.split('\t').next() == Some(GENOME_NAME) {
            let ending = &line[line.trim_end_matches(['\r', '\n']).len()..];
            let _ = write!(out, "{GENOME_NAME}\t{new}{ending}");
        } else {
            out.push_str(line);
        }
    }
    fs::write(path.as_std_path(), out)
        .map_err(|err| KiraError::Filesystem(format!("write {path}: {err}")))
}
