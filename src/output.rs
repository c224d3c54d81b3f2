use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CheckResult, ListResult, ReferenceDetails};
use crate::reconcile::ScanReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_list(result: &ListResult) {
        if result.references.is_empty() {
            println!("no references in catalog");
            return;
        }
        for record in &result.references {
            println!(
                "{:>5}  {:<20} {:<12} {:<14} {}{}",
                record.id.0,
                record.short_name.as_str(),
                record.index_version,
                record.status.as_str(),
                record.display_name,
                if record.enabled { "" } else { " (disabled)" }
            );
        }
    }

    pub fn print_details(details: &ReferenceDetails) {
        let record = &details.reference;
        println!("{} ({})", record.display_name, record.short_name);
        println!("  id:            {}", record.id);
        println!("  status:        {}", record.status);
        println!("  version:       {}", record.version);
        println!("  index version: {}", record.index_version);
        println!("  path:          {}", record.reference_path);
        if let Some(fasta) = &details.fasta {
            println!("  fasta:         {} ({} bytes)", fasta.path, fasta.size);
        }
        if details.stale_index {
            println!("  index is stale; run `kira-reflib rebuild {}`", record.id);
        }
        if record.name_mismatch {
            println!("  files on disk do not match the catalog name");
        }
        if let Some(lines) = &details.error_summary {
            println!("  error:");
            for line in lines {
                println!("    {line}");
            }
        }
    }

    pub fn print_scan(report: &ScanReport) {
        println!(
            "scanned {} partition(s): {} created, {} updated, {} deferred, {} unchanged",
            report.partitions.len(),
            report.created.len(),
            report.updated.len(),
            report.deferred.len(),
            report.unchanged
        );
        for skipped in &report.skipped {
            println!("  skipped {}: {}", skipped.path, skipped.reason);
        }
        for failed in &report.failed {
            println!("  failed {}: {}", failed.path, failed.reason);
        }
        for broken in &report.broken {
            println!("  broken {} ({}): {}", broken.short_name, broken.id, broken.reason);
        }
    }

    pub fn print_check(result: &CheckResult) {
        if result.broken.is_empty() {
            println!("all complete references are intact");
        }
        for broken in &result.broken {
            println!("{} ({}): {}", broken.short_name, broken.id, broken.reason);
        }
    }
}
