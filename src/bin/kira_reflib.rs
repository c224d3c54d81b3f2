use std::io::Read;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_reflib::app::{App, ReferenceEdit};
use kira_reflib::catalog::{Catalog, RecordStore};
use kira_reflib::config::{ConfigLoader, LibraryConfig};
use kira_reflib::domain::ReferenceId;
use kira_reflib::download::CustomDownload;
use kira_reflib::error::KiraError;
use kira_reflib::feed::{CatalogFeed, HttpCatalogFeed, NoFeed};
use kira_reflib::ingest::{IngestOutcome, UploadRequest};
use kira_reflib::jobs::{HttpScheduler, NoScheduler, Scheduler};
use kira_reflib::output::{HumanOutput, JsonOutput, OutputMode};
use kira_reflib::status::ReportStatus;

type CliApp = App<Catalog, Box<dyn Scheduler>, Box<dyn CatalogFeed>>;

#[derive(Parser)]
#[command(name = "kira-reflib")]
#[command(about = "Reference genome library manager for sequencing pipelines")]
#[command(version, author)]
struct Cli {
    /// Path to kira-reflib.json
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Reconcile the catalog with the reference library on disk")]
    Scan,
    #[command(about = "List cataloged references")]
    List,
    #[command(about = "Show one reference with its sidecar and FASTA details")]
    Show(IdArgs),
    #[command(about = "Report complete references whose files are missing")]
    Check,
    #[command(about = "Register an uploaded FASTA or zip and queue its index build")]
    Ingest(IngestArgs),
    #[command(about = "Browse or install references from the remote feed")]
    Feed(FeedArgs),
    #[command(about = "Install a reference from a URL")]
    Download(DownloadArgs),
    #[command(about = "Rebuild the index of a reference, or `all` stale ones")]
    Rebuild(RebuildArgs),
    #[command(about = "Show the status of a reference")]
    Status(IdArgs),
    #[command(about = "Apply a worker status callback (JSON on stdin or --payload)")]
    Report(ReportArgs),
    #[command(about = "Rename or update a reference")]
    Edit(EditArgs),
    #[command(about = "Delete a reference and its files")]
    Delete(IdArgs),
    #[command(about = "Move a reference stuck with a pending job to error")]
    Reset(IdArgs),
}

#[derive(Args)]
struct IdArgs {
    id: ReferenceId,
}

#[derive(Args)]
struct IngestArgs {
    #[arg(long)]
    short_name: String,
    #[arg(long)]
    name: String,
    /// Upload file name inside the temp root
    #[arg(long)]
    file: String,
    #[arg(long)]
    size: Option<u64>,
    #[arg(long, default_value = "")]
    version: String,
    #[arg(long, default_value = "")]
    notes: String,
    #[arg(long)]
    url: Option<String>,
}

#[derive(Args)]
struct FeedArgs {
    #[command(subcommand)]
    command: FeedCommand,
}

#[derive(Subcommand)]
enum FeedCommand {
    #[command(about = "List references offered by the feed")]
    List,
    #[command(about = "Install a feed entry by identity hash")]
    Install { identity_hash: String },
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long)]
    url: String,
    #[arg(long)]
    short_name: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    version: String,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Args)]
struct RebuildArgs {
    /// Reference id or `all`
    target: String,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    payload: Option<String>,
}

#[derive(Args)]
struct EditArgs {
    id: ReferenceId,
    #[arg(long)]
    short_name: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::ReferenceNotFound(_) | KiraError::MonitorNotFound(_) => 2,
        KiraError::MissingConfig | KiraError::ConfigRead(_) | KiraError::ConfigParse(_) => 2,
        KiraError::Dispatch(_)
        | KiraError::SchedulerStatus { .. }
        | KiraError::CatalogHttp(_)
        | KiraError::CatalogParse(_) => 3,
        KiraError::Conflict { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(config)?;

    match cli.command {
        Commands::Scan => {
            let report = app.scan_library()?;
            match mode {
                OutputMode::Json => JsonOutput::print(&report).into_diagnostic(),
                OutputMode::Human => {
                    HumanOutput::print_scan(&report);
                    Ok(())
                }
            }
        }
        Commands::List => {
            let result = app.list()?;
            match mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic(),
                OutputMode::Human => {
                    HumanOutput::print_list(&result);
                    Ok(())
                }
            }
        }
        Commands::Show(args) => {
            let details = app.reference_details(args.id)?;
            match mode {
                OutputMode::Json => JsonOutput::print(&details).into_diagnostic(),
                OutputMode::Human => {
                    HumanOutput::print_details(&details);
                    Ok(())
                }
            }
        }
        Commands::Check => {
            let result = app.check_references()?;
            match mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic(),
                OutputMode::Human => {
                    HumanOutput::print_check(&result);
                    Ok(())
                }
            }
        }
        Commands::Ingest(args) => {
            let outcome = app
                .ingest_upload(UploadRequest {
                    short_name: args.short_name,
                    display_name: args.name,
                    upload_name: args.file,
                    reported_size: args.size,
                    version: args.version,
                    notes: args.notes,
                    url: args.url,
                })?;
            finish_dispatch(outcome)
        }
        Commands::Feed(args) => run_feed(&app, args.command),
        Commands::Download(args) => {
            let outcome = app
                .install_custom(CustomDownload {
                    url: args.url,
                    short_name: args.short_name,
                    display_name: args.name,
                    version: args.version,
                    notes: args.notes,
                })?;
            finish_dispatch(outcome)
        }
        Commands::Rebuild(args) => {
            if args.target.eq_ignore_ascii_case("all") {
                let report = app.rebuild_stale()?;
                JsonOutput::print(&report).into_diagnostic()
            } else {
                let id: ReferenceId = args.target.parse()?;
                let record = app.rebuild_index(id)?;
                JsonOutput::print(&record).into_diagnostic()
            }
        }
        Commands::Status(args) => {
            let ack = app.status_of(args.id)?;
            JsonOutput::print(&ack).into_diagnostic()
        }
        Commands::Report(args) => {
            let payload = match args.payload {
                Some(payload) => payload,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .into_diagnostic()?;
                    buffer
                }
            };
            let report: ReportStatus = serde_json::from_str(&payload)
                .map_err(|err| KiraError::MalformedCallback(err.to_string()))?;
            let ack = app.report_status(report)?;
            JsonOutput::print(&ack).into_diagnostic()
        }
        Commands::Edit(args) => {
            let current = app.catalog().get_reference(args.id)?;
            let enabled = if args.enable {
                true
            } else if args.disable {
                false
            } else {
                current.enabled
            };
            let edit = ReferenceEdit {
                short_name: args
                    .short_name
                    .unwrap_or_else(|| current.short_name.to_string()),
                display_name: args.name.unwrap_or(current.display_name),
                notes: args.notes,
                enabled,
            };
            let record = app.edit_reference(args.id, edit)?;
            JsonOutput::print(&record).into_diagnostic()
        }
        Commands::Delete(args) => {
            let result = app.delete_reference(args.id)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        Commands::Reset(args) => {
            let record = app.reset_reference(args.id)?;
            JsonOutput::print(&record).into_diagnostic()
        }
    }
}

fn build_app(config: LibraryConfig) -> Result<CliApp, KiraError> {
    let catalog = Catalog::open(&config.catalog_path)?;
    let scheduler: Box<dyn Scheduler> = match &config.scheduler_url {
        Some(url) => Box::new(HttpScheduler::new(url, config.dispatch_timeout)?),
        None => Box::new(NoScheduler),
    };
    let feed: Box<dyn CatalogFeed> = match &config.reference_list_url {
        Some(url) => Box::new(HttpCatalogFeed::new(url, config.feed_timeout)?),
        None => Box::new(NoFeed),
    };
    Ok(App::new(config, catalog, scheduler, feed))
}

fn run_feed(app: &CliApp, command: FeedCommand) -> miette::Result<()> {
    match command {
        FeedCommand::List => {
            let available = app.available_references()?;
            JsonOutput::print(&available).into_diagnostic()
        }
        FeedCommand::Install { identity_hash } => {
            let available = app.available_references()?;
            let entry = available
                .references
                .into_iter()
                .find(|candidate| candidate.entry.meta.identity_hash == identity_hash)
                .ok_or_else(|| {
                    miette::Report::msg(format!("no feed entry with identity hash {identity_hash}"))
                })?;
            if let Some(id) = entry.installed {
                return Err(miette::Report::msg(format!(
                    "already installed as reference {id}"
                )));
            }
            let outcome = app.install_from_feed(&entry.entry)?;
            finish_dispatch(outcome)
        }
    }
}

fn finish_dispatch(outcome: IngestOutcome) -> miette::Result<()> {
    JsonOutput::print(&outcome).into_diagnostic()?;
    match outcome.dispatch_error {
        Some(detail) => Err(KiraError::Dispatch(detail).into()),
        None => Ok(()),
    }
}
