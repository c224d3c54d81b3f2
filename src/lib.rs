pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod feed;
pub mod fs_util;
pub mod ingest;
pub mod jobs;
pub mod output;
pub mod rebuild;
pub mod reconcile;
pub mod record;
pub mod rename;
pub mod sidecar;
pub mod status;
pub mod store;
