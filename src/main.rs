//! cms-admin - CMS admin core command line
//!
//! Uploads media through the sequential upload queue, inspects widget
//! registries and renders preview templates.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cms_admin_core::config::Config;
use cms_admin_core::logging::{init_logging, LogFormat};
use cms_admin_core::metrics::server::MetricsServer;
use cms_admin_core::registry::{RegistryManifest, WidgetRegistryResolver};
use cms_admin_core::template::Template;
use cms_admin_core::upload::http::HttpTransport;
use cms_admin_core::upload::{Destination, UploadPayload, UploadQueueManager, UploadStatus};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// cms-admin - upload queue, widget registry and template preview tools
#[derive(Parser, Debug)]
#[command(name = "cms-admin")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cms-admin.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, default_value = "json")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files one at a time through the upload queue
    Upload {
        /// Target namespace
        #[arg(long)]
        namespace: String,

        /// Target folder inside the namespace
        #[arg(long, default_value = "/")]
        folder: String,

        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Inspect the widget registries listed in the configuration
    Widgets {
        #[command(subcommand)]
        action: WidgetsCommand,
    },

    /// Render a preview template against a JSON context
    Render {
        /// Template file
        template: PathBuf,

        /// JSON context file (defaults to an empty object)
        #[arg(long)]
        context: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum WidgetsCommand {
    /// List every available widget type
    List,
    /// Show the winning definition of a widget type
    Resolve { widget_type: String },
    /// Search widget names, descriptions, tags and types
    Search { term: String },
    /// List widget types in a category ("all" for every type)
    Category { category: String },
    /// Show registered registries by priority
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let format: LogFormat = args.log_format.parse()?;
    init_logging(&args.log_level, format)?;

    match args.command {
        Command::Upload {
            namespace,
            folder,
            files,
        } => {
            let config = load_config(&args.config)?;
            run_upload(&config, Destination::new(namespace, folder), files).await
        }
        Command::Widgets { action } => {
            let config = load_config(&args.config)?;
            run_widgets(&config, &args.config, action)
        }
        Command::Render { template, context } => run_render(&template, context.as_deref()),
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

async fn run_upload(
    config: &Config,
    destination: Destination,
    files: Vec<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let transport_config = config
        .transport
        .as_ref()
        .context("Configuration has no transport section")?;
    let transport = HttpTransport::from_config(transport_config)?;
    let queue = UploadQueueManager::new(Arc::new(transport), config.upload.clone());

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::builder()
            .address(&config.metrics.address)
            .upload_queue(queue.clone())
            .build()?;
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let mut payloads = Vec::with_capacity(files.len());
    for path in &files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        payloads.push(UploadPayload::new(filename, data));
    }

    info!(
        "Uploading {} file(s) to {}:{}",
        payloads.len(),
        destination.namespace,
        destination.folder
    );
    let ids = queue.enqueue(payloads, destination);

    let interrupted = tokio::select! {
        _ = queue.wait_until_idle() => false,
        _ = tokio::signal::ctrl_c() => {
            let cancelled = queue.cancel_remaining();
            warn!("Interrupted, cancelled {} remaining upload(s)", cancelled);
            true
        }
    };

    let mut statuses = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(item) = queue.get_upload(id) else {
            continue;
        };
        statuses.push(item.status);
        match item.status {
            UploadStatus::Completed => {
                println!("{}\tcompleted\tretries={}", item.filename(), item.retry_count);
            }
            status => {
                println!(
                    "{}\t{}\t{}",
                    item.filename(),
                    status,
                    item.error.as_deref().unwrap_or("")
                );
            }
        }
    }

    let stats = queue.queue_stats();
    info!(
        "Upload finished: {} completed, {} failed, {} cancelled",
        stats.completed, stats.failed, stats.cancelled
    );

    if let Some(server) = metrics_server.as_mut() {
        server.shutdown().await;
    }

    Ok(if upload_succeeded(&statuses, interrupted) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Every file completed and the run was not interrupted
fn upload_succeeded(statuses: &[UploadStatus], interrupted: bool) -> bool {
    !interrupted && statuses.iter().all(|s| *s == UploadStatus::Completed)
}

fn run_widgets(
    config: &Config,
    config_path: &Path,
    action: WidgetsCommand,
) -> anyhow::Result<ExitCode> {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let manifests = RegistryManifest::load_all(config.registry_paths(base))?;
    let resolver = WidgetRegistryResolver::from_manifests(manifests);

    match action {
        WidgetsCommand::List => {
            for widget_type in resolver.list_available_types() {
                println!("{}", widget_type);
            }
        }
        WidgetsCommand::Resolve { widget_type } => match resolver.resolve_metadata(&widget_type) {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => {
                eprintln!("Widget type '{}' is not supported", widget_type);
                return Ok(ExitCode::FAILURE);
            }
        },
        WidgetsCommand::Search { term } => {
            for widget_type in resolver.search(&term) {
                println!("{}", widget_type);
            }
        }
        WidgetsCommand::Category { category } => {
            for widget_type in resolver.filter_by_category(&category) {
                println!("{}", widget_type);
            }
        }
        WidgetsCommand::Info => {
            println!(
                "{}",
                serde_json::to_string_pretty(&resolver.registry_info())?
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_render(template_path: &Path, context_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(template_path)
        .with_context(|| format!("Failed to read template {}", template_path.display()))?;
    let context: serde_json::Value = match context_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON context in {}", path.display()))?
        }
        None => serde_json::Value::Object(Default::default()),
    };

    let template = Template::parse(&source)?;
    print!("{}", template.render(&context));
    Ok(ExitCode::SUCCESS)
}
