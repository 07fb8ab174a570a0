//! Splice upload CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use splice_client::{ClientError, HttpTransport, UploadCoordinator, UploadStatus, fingerprint_file};
use splice_core::ArtifactName;
use splice_core::config::ClientConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "splice")]
#[command(about = "Resumable, deduplicated chunked uploads")]
#[command(version)]
struct Cli {
    /// Client config file path
    #[arg(long, env = "SPLICE_CLIENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides client config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Chunk size in bytes (overrides client config)
    #[arg(long, global = true)]
    chunk_size: Option<u64>,

    /// Concurrent chunk transfers (overrides client config)
    #[arg(long, global = true)]
    parallel: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, resuming any earlier partial upload
    Upload {
        file: PathBuf,
        /// Published name (default: the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the file's fingerprint
    Fingerprint { file: PathBuf },
    /// Show whether the file is published and which chunks are missing
    Status {
        file: PathBuf,
        /// Published name (default: the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Discard chunks staged on the server for the file
    Cancel { file: PathBuf },
}

/// Load client configuration: optional TOML file, `SPLICE_CLIENT_` environment
/// variables, then command-line overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut figment = Figment::new();
    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }
    let mut config: ClientConfig = figment
        .merge(Env::prefixed("SPLICE_CLIENT_"))
        .extract()
        .context("failed to load client configuration")?;

    if let Some(server) = &cli.server {
        config.server = server.clone();
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(parallel) = cli.parallel {
        config.max_parallel = parallel;
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid client configuration")?;
    Ok(config)
}

fn artifact_name(file: &Path, name: Option<&str>) -> Result<ArtifactName> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a name from {}", file.display()))?,
    };
    Ok(ArtifactName::parse(&name)?)
}

fn coordinator(config: &ClientConfig) -> Result<UploadCoordinator<HttpTransport>> {
    let transport = HttpTransport::new(config)?;
    let coordinator = UploadCoordinator::new(transport, config.clone());

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight chunks...");
            token.cancel();
        }
    });
    Ok(coordinator)
}

fn format_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Fingerprint { file } => {
            let (plan, fingerprint) = fingerprint_file(file, config.chunk_size, |_, _| {})
                .await
                .with_context(|| format!("failed to fingerprint {}", file.display()))?;
            println!("{fingerprint}  {}", file.display());
            eprintln!(
                "{} bytes in {} chunk(s) of {} bytes",
                plan.file_size(),
                plan.chunk_count(),
                plan.chunk_size()
            );
        }
        Commands::Upload { file, name } => {
            let name = artifact_name(file, name.as_deref())?;
            let coordinator = coordinator(&config)?;
            match coordinator.upload(file, &name).await {
                Ok(report) => {
                    if report.instant {
                        println!("Already published: {}", report.locator);
                    } else {
                        println!(
                            "Published {} ({} bytes, {} of {} chunk(s) sent)",
                            report.locator,
                            report.artifact.size_bytes,
                            report.chunks_sent,
                            report.chunk_count
                        );
                    }
                    println!("Fingerprint: {}", report.fingerprint);
                }
                Err(e) => {
                    if let Some(missing) = e.missing().filter(|m| !m.is_empty()) {
                        eprintln!("Missing chunks: {}", format_indices(missing));
                    }
                    if matches!(e, ClientError::Cancelled { .. }) {
                        eprintln!("Staged chunks were kept; run the same upload again to resume.");
                    }
                    return Err(e).context("upload failed");
                }
            }
        }
        Commands::Status { file, name } => {
            let name = artifact_name(file, name.as_deref())?;
            let coordinator = coordinator(&config)?;
            match coordinator.status(file, &name).await? {
                UploadStatus::Published {
                    fingerprint,
                    locator,
                    artifact,
                } => {
                    println!("Published: {locator}");
                    println!("Size: {} bytes", artifact.size_bytes);
                    println!("Fingerprint: {fingerprint}");
                }
                UploadStatus::Pending {
                    fingerprint,
                    chunk_count,
                    missing,
                } => {
                    println!("Not published");
                    println!("Fingerprint: {fingerprint}");
                    println!(
                        "Staged: {} of {chunk_count} chunk(s)",
                        chunk_count as usize - missing.len()
                    );
                    if !missing.is_empty() {
                        println!("Missing: {}", format_indices(&missing));
                    }
                }
            }
        }
        Commands::Cancel { file } => {
            let coordinator = coordinator(&config)?;
            let (fingerprint, removed) = coordinator.cancel(file).await?;
            if removed {
                println!("Discarded staged chunks for {fingerprint}");
            } else {
                println!("Nothing staged for {fingerprint}");
            }
        }
    }

    Ok(())
}
