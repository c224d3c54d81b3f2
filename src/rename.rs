use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::domain::ShortName;
use crate::error::KiraError;
use crate::fs_util::replace_last;
use crate::record::ReferenceRecord;
use crate::sidecar::rewrite_genome_name;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedMove {
    from: Utf8PathBuf,
    to: Utf8PathBuf,
}

pub fn rename_reference(
    record: &ReferenceRecord,
    new_short_name: &ShortName,
    new_display_name: &str,
) -> Result<Utf8PathBuf, KiraError> {
    let old_dir = record.reference_path.clone();
    let old_short = record.short_name.as_str();
    let short_changed = record.short_name != *new_short_name;

    // Member files move before their directory.
    let new_dir = if short_changed {
        let parent = old_dir.parent().ok_or_else(|| clean_failure(format!(
            "reference path {old_dir} has no parent directory"
        )))?;
        let new_dir = parent.join(new_short_name.as_str());
        let moves = plan_member_moves(&old_dir, old_short, new_short_name.as_str())?;
        if new_dir.as_std_path().exists() {
            return Err(clean_failure(format!("destination {new_dir} already exists")));
        }

        let done = apply_moves(&moves)?;
        if let Err(err) = fs::rename(old_dir.as_std_path(), new_dir.as_std_path()) {
            let message = format!("move {old_dir} to {new_dir}: {err}");
            return Err(roll_back(&done, message));
        }
        info!(from = %old_dir, to = %new_dir, files = done.len(), "moved reference directory");
        new_dir
    } else {
        old_dir
    };

    if record.display_name != new_display_name {
        let sidecar = new_dir.join(format!("{new_short_name}.info.txt"));
        rewrite_genome_name(&sidecar, new_display_name).map_err(|err| {
            KiraError::Rename {
                message: format!("rewrite {sidecar}: {err}"),
                partial: short_changed,
            }
        })?;
    }
    Ok(new_dir)
}

fn plan_member_moves(
    dir: &Utf8Path,
    old_short: &str,
    new_short: &str,
) -> Result<Vec<PlannedMove>, KiraError> {
    if !dir.as_std_path().is_dir() {
        return Err(clean_failure(format!("reference directory {dir} is missing")));
    }
    let prefix = format!("{old_short}.");
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| clean_failure(format!("read {dir}: {err}")))?;
    let mut moves = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| clean_failure(err.to_string()))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        moves.push(PlannedMove {
            from: dir.join(&name),
            to: dir.join(replace_last(&name, old_short, new_short)),
        });
    }
    moves.sort_by(|a, b| a.from.cmp(&b.from));

    for planned in &moves {
        let freed_by_plan = moves.iter().any(|other| other.from == planned.to);
        if planned.to.as_std_path().exists() && !freed_by_plan {
            return Err(clean_failure(format!("destination {} already exists", planned.to)));
        }
    }
    Ok(moves)
}

fn apply_moves(moves: &[PlannedMove]) -> Result<Vec<PlannedMove>, KiraError> {
    let mut done = Vec::with_capacity(moves.len());
    for planned in moves {
        if let Err(err) = fs::rename(planned.from.as_std_path(), planned.to.as_std_path()) {
            let message = format!("rename {} to {}: {err}", planned.from, planned.to);
            return Err(roll_back(&done, message));
        }
        done.push(planned.clone());
    }
    Ok(done)
}

fn roll_back(done: &[PlannedMove], message: String) -> KiraError {
    let mut stuck = Vec::new();
    for planned in done.iter().rev() {
        if let Err(err) = fs::rename(planned.to.as_std_path(), planned.from.as_std_path()) {
            warn!(file = %planned.to, error = %err, "could not undo rename");
            stuck.push(planned.to.to_string());
        }
    }
    if stuck.is_empty() {
        KiraError::Rename {
            message,
            partial: false,
        }
    } else {
        KiraError::Rename {
            message: format!("{message}; left renamed: {}", stuck.join(", ")),
            partial: true,
        }
    }
}

fn clean_failure(message: String) -> KiraError {
    KiraError::Rename {
        message,
        partial: false,
    }
}
