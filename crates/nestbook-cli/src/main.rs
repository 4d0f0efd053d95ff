//! Nestbook CLI: drive the asset pipeline against a Nestbook backend.
//!
//! Set NESTBOOK_API_URL (or API_URL) and optionally NESTBOOK_API_KEY.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nestbook_api_client::{ApiClient, AssetReference, AssetView, TransferOptions, UploadOrchestrator};
use nestbook_cli::{init_tracing, progress_line};
use nestbook_core::{validate_batch, CandidateFile, ClientConfig, Folder, UploadMode, UploadRules};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

const NAME_WIDTH: usize = 32;

#[derive(Parser)]
#[command(name = "nestbook", about = "Nestbook asset pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Files to check or upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Target folder: photos, documents, profile-pics
    #[arg(long, default_value = Folder::PHOTOS)]
    folder: String,
    /// Accept a single file only
    #[arg(long)]
    single: bool,
    /// In single mode, report extra files instead of dropping them
    #[arg(long)]
    strict_single: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate files against the folder's upload rules
    Validate(SelectionArgs),
    /// Validate and upload files
    Upload(SelectionArgs),
    /// Classify references and show the URL they resolve to
    Resolve {
        /// References: local paths, URLs or storage keys
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Load one reference the way an image view would
    Fetch {
        reference: String,
        /// Alternate URL tried once if the primary load fails
        #[arg(long)]
        fallback: Option<String>,
        /// Write the loaded bytes to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport {
    valid_files: Vec<String>,
    errors: Vec<String>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn rules_for(config: &ClientConfig, folder: &Folder, strict_single: bool) -> UploadRules {
    let rules = match folder.as_str() {
        // Env overrides apply to the default photo rules.
        Folder::PHOTOS => config.rules.clone(),
        _ => UploadRules::for_folder(folder),
    };
    rules.with_strict_single(strict_single)
}

fn mode(single: bool) -> UploadMode {
    if single {
        UploadMode::Single
    } else {
        UploadMode::Multiple
    }
}

async fn load_files(paths: &[PathBuf]) -> anyhow::Result<Vec<CandidateFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = CandidateFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => {
            let config = ClientConfig::from_env().context("Invalid configuration")?;
            let folder = Folder::new(args.folder);
            let rules = rules_for(&config, &folder, args.strict_single);
            let files = load_files(&args.files).await?;

            let batch = validate_batch(files, &rules, mode(args.single));
            print_json(&ValidationReport {
                valid_files: batch.valid_files.into_iter().map(|f| f.name).collect(),
                errors: batch.errors,
            })?;
        }
        Commands::Upload(args) => {
            let client = ApiClient::from_env().context(
                "Failed to create API client. Set NESTBOOK_API_URL (or API_URL) and NESTBOOK_API_KEY",
            )?;
            let folder = Folder::new(args.folder);
            let rules = rules_for(client.config(), &folder, args.strict_single);
            let options = TransferOptions::from_config(client.config());
            let files = load_files(&args.files).await?;

            let orchestrator = UploadOrchestrator::new(client, folder, rules, mode(args.single))
                .with_options(options);

            let mut events = orchestrator.subscribe();
            let printer = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => eprintln!("{}", progress_line(&event, NAME_WIDTH)),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Progress output lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let outcome = orchestrator.upload_files(files).await;
            let state = orchestrator.state();
            drop(orchestrator);
            let _ = printer.await;

            print_json(&state)?;
            if let Err(e) = outcome {
                anyhow::bail!("Upload failed: {}", e.message());
            }
        }
        Commands::Resolve { references } => {
            let config = ClientConfig::from_env().context("Invalid configuration")?;
            let rewriter = nestbook_storage::ReferenceRewriter::from_config(&config);
            let resolved: Vec<_> = references
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "reference": r,
                        "resolved": rewriter.resolve(r),
                    })
                })
                .collect();
            print_json(&resolved)?;
        }
        Commands::Fetch {
            reference,
            fallback,
            output,
        } => {
            let client = ApiClient::from_env().context(
                "Failed to create API client. Set NESTBOOK_API_URL (or API_URL)",
            )?;
            let timeout = client.config().image_load_timeout;
            let rewriter = client.rewriter();

            let mut view = AssetView::new(rewriter, Arc::new(client)).with_load_timeout(timeout);
            if let Some(fallback) = fallback {
                view = view.with_fallback(fallback);
            }

            let state = view.show(AssetReference::new(reference)).await;
            if let (Some(path), Some(bytes)) = (output, view.content()) {
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), size = bytes.len(), "Saved image");
            }
            print_json(&state)?;
            if state.is_error() {
                anyhow::bail!("Image failed to load");
            }
        }
    }

    Ok(())
}
