//! `facet` - command-line front end for the face metadata gateway.
//!
//! Every command opens the backend selected by `FACET_BACKEND` (see
//! [`facet_gateway::config`] for all settings), performs one operation and
//! prints its result to stdout as pretty JSON. Diagnostics go to stderr and,
//! when `FACET_LOG_DIR` is set, to a daily rolling log file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facet_gateway::config::GatewayConfig;
use facet_gateway::persistence::{
    Collection, FaceRepository, Gateway, PersistenceError, PersonRepository,
};
use facet_gateway::{health, import};
use facet_records::{GroupId, PageRequest, PersonPatch, DEFAULT_PAGE_SIZE};

#[derive(Parser)]
#[command(name = "facet", about = "Face and person metadata store", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import face documents from a metadata directory, then derive persons.
    Import {
        /// Directory of `*.json` face documents. Defaults to `FACET_IMPORT_DIR`.
        dir: Option<PathBuf>,
        /// Skip the person derivation pass.
        #[arg(long)]
        faces_only: bool,
    },
    /// Rebuild persons from the faces already stored.
    DerivePersons,
    /// Probe the configured backend. Exits non-zero when degraded.
    Health,
    /// Query and manage face records.
    Faces {
        #[command(subcommand)]
        action: FaceAction,
    },
    /// Query and manage person records.
    Persons {
        #[command(subcommand)]
        action: PersonAction,
    },
}

#[derive(Args)]
struct PageArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Return the whole collection, ignoring paging.
    #[arg(long, conflicts_with_all = ["page", "page_size"])]
    all: bool,
}

impl PageArgs {
    fn request(&self) -> Result<Option<PageRequest>, PersistenceError> {
        if self.all {
            return Ok(None);
        }
        Ok(Some(PageRequest::new(self.page, self.page_size)?))
    }
}

#[derive(Subcommand)]
enum FaceAction {
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    Get {
        face_id: String,
    },
    Delete {
        face_id: String,
    },
    /// Faces sharing a group id.
    Group {
        group_id: GroupId,
    },
    Count,
}

#[derive(Subcommand)]
enum PersonAction {
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    Get {
        person_id: GroupId,
    },
    /// Create a person under the next free id.
    Add {
        name: String,
    },
    Rename {
        person_id: GroupId,
        name: String,
    },
    Delete {
        person_id: GroupId,
    },
    /// Persons whose name contains FRAGMENT, ignoring case.
    Search {
        fragment: String,
    },
    /// Faces belonging to a person.
    Faces {
        person_id: GroupId,
    },
    /// Assign names from a file, one per line, to the given ids in order.
    NameFile {
        names_file: PathBuf,
        #[arg(required = true)]
        ids: Vec<GroupId>,
    },
}

/// Install the global subscriber. The returned guard flushes the file
/// writer when dropped and must live until exit.
fn init_tracing(config: &GatewayConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (file_layer, guard) = match &config.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir).ok();
            let file_appender = tracing_appender::rolling::daily(log_dir, "facet.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = GatewayConfig::from_env().context("invalid configuration")?;
    let _guard = init_tracing(&config);

    tracing::debug!(backend = %config.backend, data_dir = %config.data_dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Health => {
            let status = health::check_config(&config).await;
            print_json(&status)?;
            return Ok(if status.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Commands::Import { dir, faces_only } => {
            let gateway = open_gateway(&config).await?;
            let dir = dir.unwrap_or_else(|| config.import_dir.clone());
            let summary = if faces_only {
                import::ImportSummary {
                    faces: import::import_faces(&gateway, &dir).await?,
                    ..Default::default()
                }
            } else {
                import::import_directory(&gateway, &dir).await?
            };
            print_json(&summary)?;
            if summary.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::DerivePersons => {
            let gateway = open_gateway(&config).await?;
            print_json(&import::derive_persons(&gateway, &gateway).await?)?;
        }
        Commands::Faces { action } => {
            run_face_action(&open_gateway(&config).await?, action).await?;
        }
        Commands::Persons { action } => {
            run_person_action(&open_gateway(&config).await?, action).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_gateway(config: &GatewayConfig) -> anyhow::Result<Gateway> {
    Gateway::open(config)
        .await
        .with_context(|| format!("failed to open {} backend", config.backend))
}

async fn run_face_action(gateway: &Gateway, action: FaceAction) -> anyhow::Result<()> {
    match action {
        FaceAction::List { page } => print_json(&gateway.list_faces(page.request()?).await?),
        FaceAction::Get { face_id } => match gateway.load_face(&face_id).await? {
            Some(face) => print_json(&face),
            None => Err(PersistenceError::NotFound {
                collection: Collection::Faces,
                key: face_id,
            }
            .into()),
        },
        FaceAction::Delete { face_id } => {
            gateway.delete_face(&face_id).await?;
            print_json(&serde_json::json!({ "deleted": face_id }))
        }
        FaceAction::Group { group_id } => {
            print_json(&gateway.find_faces_by_group(group_id).await?)
        }
        FaceAction::Count => print_json(&serde_json::json!({ "faces": gateway.count_faces().await? })),
    }
}

async fn run_person_action(gateway: &Gateway, action: PersonAction) -> anyhow::Result<()> {
    match action {
        PersonAction::List { page } => print_json(&gateway.list_persons(page.request()?).await?),
        PersonAction::Get { person_id } => {
            let person = require_person(gateway, person_id).await?;
            print_json(&person)
        }
        PersonAction::Add { name } => print_json(&gateway.insert_named_person(&name).await?),
        PersonAction::Rename { person_id, name } => {
            let updated = gateway
                .update_person(person_id, &PersonPatch::rename(name))
                .await?;
            print_json(&updated)
        }
        PersonAction::Delete { person_id } => {
            gateway.delete_person(person_id).await?;
            print_json(&serde_json::json!({ "deleted": person_id }))
        }
        PersonAction::Search { fragment } => {
            print_json(&gateway.find_persons_by_name(&fragment).await?)
        }
        PersonAction::Faces { person_id } => {
            require_person(gateway, person_id).await?;
            print_json(&gateway.find_faces_by_group(person_id).await?)
        }
        PersonAction::NameFile { names_file, ids } => {
            let written = import::assign_person_names(gateway, &ids, &names_file).await?;
            print_json(&serde_json::json!({ "named": written }))
        }
    }
}

async fn require_person(
    gateway: &Gateway,
    person_id: GroupId,
) -> Result<facet_records::PersonRecord, PersistenceError> {
    gateway
        .load_person(person_id)
        .await?
        .ok_or_else(|| PersistenceError::NotFound {
            collection: Collection::Persons,
            key: person_id.to_string(),
        })
}
