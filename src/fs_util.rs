use std::fs;
use std::path::Path;

use zip::ZipArchive;

use crate::error::KiraError;

const FASTA_SUFFIXES: [&str; 2] = [".fa", ".fasta"];

pub fn is_fasta_name(name: &str) -> bool {
    FASTA_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub fn is_zip_archive(path: &Path) -> bool {
    fs::File::open(path)
        .ok()
        .map(|file| ZipArchive::new(file).is_ok())
        .unwrap_or(false)
}

pub fn archive_members(zip_path: &Path) -> Result<Vec<String>, KiraError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| KiraError::Filesystem(err.to_string()))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        names.push(entry.name().to_string());
    }
    Ok(names)
}

pub fn fasta_members(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| is_fasta_name(name))
        .cloned()
        .collect()
}

pub fn replace_last(value: &str, old: &str, new: &str) -> String {
    match value.rfind(old) {
        Some(idx) if !old.is_empty() => {
            format!("{}{}{}", &value[..idx], new, &value[idx + old.len()..])
        }
        _ => value.to_string(),
    }
}
