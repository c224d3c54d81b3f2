use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{ReferenceId, ReferenceStatus};

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid short name: {0}")]
    #[diagnostic(help("valid characters are letters, numbers, and underscores"))]
    InvalidShortName(String),

    #[error("invalid reference status: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Validation(String),

    #[error("missing config file kira-reflib.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("reference not found: {0}")]
    ReferenceNotFound(ReferenceId),

    #[error("file monitor not found: {0}")]
    MonitorNotFound(u64),

    #[error("reference {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: ReferenceId,
        from: ReferenceStatus,
        to: ReferenceStatus,
    },

    #[error("concurrent update of reference {id}: {message}")]
    Conflict { id: ReferenceId, message: String },

    #[error("rename failed: {message}")]
    Rename { message: String, partial: bool },

    #[error("broken reference {short_name}: {reason}")]
    BrokenReference { short_name: String, reason: String },

    #[error("malformed status callback: {0}")]
    MalformedCallback(String),

    #[error("job dispatch failed: {0}")]
    Dispatch(String),

    #[error("scheduler returned status {status}: {message}")]
    SchedulerStatus { status: u16, message: String },

    #[error("reference catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("failed to decode reference catalog: {0}")]
    CatalogParse(String),

    #[error("failed to persist catalog: {0}")]
    CatalogPersist(String),
}
