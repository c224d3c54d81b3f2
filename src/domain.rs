use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static SHORT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("short name pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub u64);

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReferenceId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(ReferenceId)
            .map_err(|_| KiraError::Validation(format!("invalid reference id: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(pub u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortName(String);

impl ShortName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShortName {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !SHORT_NAME_RE.is_match(value) {
            return Err(KiraError::InvalidShortName(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl PartialEq<str> for ShortName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStatus {
    Preprocessing,
    Queued,
    Indexing,
    Downloading,
    Installing,
    Complete,
    Error,
}

impl ReferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceStatus::Preprocessing => "preprocessing",
            ReferenceStatus::Queued => "queued",
            ReferenceStatus::Indexing => "indexing",
            ReferenceStatus::Downloading => "downloading",
            ReferenceStatus::Installing => "installing",
            ReferenceStatus::Complete => "complete",
            ReferenceStatus::Error => "error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ReferenceStatus::Indexing | ReferenceStatus::Downloading | ReferenceStatus::Installing
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ReferenceStatus::Preprocessing | ReferenceStatus::Queued
        ) || self.is_running()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReferenceStatus::Complete | ReferenceStatus::Error)
    }

    pub fn can_transition_to(&self, next: ReferenceStatus) -> bool {
        use ReferenceStatus::*;
        match (self, next) {
            (Preprocessing, Queued | Error) => true,
            (Queued, Indexing | Downloading | Installing | Complete | Error) => true,
            (from, to) if from.is_running() => to.is_running() || to.is_terminal(),
            (Complete, Queued | Indexing) => true,
            (Error, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceStatus {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "preprocessing" => Ok(ReferenceStatus::Preprocessing),
            "queued" => Ok(ReferenceStatus::Queued),
            "indexing" => Ok(ReferenceStatus::Indexing),
            "downloading" => Ok(ReferenceStatus::Downloading),
            "installing" => Ok(ReferenceStatus::Installing),
            "complete" => Ok(ReferenceStatus::Complete),
            "error" => Ok(ReferenceStatus::Error),
            _ => Err(KiraError::InvalidStatus(value.to_string())),
        }
    }
}

/// Natural ordering for index versions: digit runs compare numerically,
/// everything else byte-wise, so `tmap-f10` sorts after `tmap-f9`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let mut a = chunks(left).into_iter();
    let mut b = chunks(right).into_iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u128>(), y.parse::<u128>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny).then_with(|| x.len().cmp(&y.len())),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn chunks(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = None;
    for (idx, ch) in value.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match digits {
            Some(prev) if prev != is_digit => {
                out.push(&value[start..idx]);
                start = idx;
            }
            _ => {}
        }
        digits = Some(is_digit);
    }
    if start < value.len() {
        out.push(&value[start..]);
    }
    out
}
