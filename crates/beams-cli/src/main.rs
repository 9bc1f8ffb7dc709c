//! xray-beams: edit an Xray test repository as a tree of feature files.
//!
//! Connects to the remote, builds the virtual tree and runs one command against it.
//! `watch` keeps running and feeds edits of the checkout directory into the tree.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use beams_cli::{Checkout, Config, FileEvent, FileEventKind, FileWatcher, JiraClient};
use beams_core::tree::basename;
use beams_core::{
    EntryKind, ReconcileError, RemoteRepository, RenameOptions, Workspace, WriteOptions,
};

#[derive(Parser, Debug)]
#[command(name = "xray-beams")]
#[command(about = "Edit an Xray test repository as feature files")]
struct Args {
    /// Config file (default: ~/.config/xray-beams/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Checkout directory, overrides `checkout_dir` from the config
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List folders with their feature files
    Tree,
    /// Print the feature file of a folder
    Show { path: String },
    /// List tests without a folder, or print one as a scenario
    Orphans { key: Option<String> },
    /// List text preconditions, or print one as a background
    Preconditions { key: Option<String> },
    /// Write every feature file into the checkout directory
    Checkout,
    /// Show which checked-out files differ from the remote
    Status,
    /// Push checked-out changes to the remote
    Commit,
    /// Track edits of the checkout directory and report diagnostics live
    Watch,
    /// Create a folder
    Mkdir { path: String },
    /// Rename or move a folder
    Mv { from: String, to: String },
    /// Delete a folder
    Rm { path: String },
}

/// Accept `Billing/Late` as well as `/Billing/Late`.
fn virtual_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

fn checkout(args: &Args, config: &Config) -> Result<Checkout> {
    let dir = args
        .dir
        .clone()
        .or_else(|| config.checkout_dir.clone())
        .context("No checkout directory: pass --dir or set checkout_dir")?;
    Ok(Checkout::new(dir))
}

fn print_status<R: RemoteRepository>(workspace: &Workspace<R>) {
    let dirty = workspace.dirty_paths();
    if dirty.is_empty() {
        println!("No changes");
    }
    for path in dirty {
        println!("modified: {}", path);
    }
    for diagnostic in workspace.diagnostics() {
        println!(
            "{}:{}:{}: {}",
            diagnostic.path,
            diagnostic.range.start_line + 1,
            diagnostic.range.start_column + 1,
            diagnostic.message
        );
    }
}

async fn on_file_event<R: RemoteRepository>(
    workspace: &mut Workspace<R>,
    checkout: &Checkout,
    event: FileEvent,
) {
    match event.kind {
        FileEventKind::Modified => {
            let content = match checkout.read(&event.path).await {
                Ok(Some(content)) => content,
                Ok(None) => return,
                Err(e) => {
                    error!("Failed to read {}: {}", event.path, e);
                    return;
                }
            };
            if workspace.folder_for(&event.path).is_none() {
                debug!("Ignoring {}: not a folder feature file", event.path);
                return;
            }
            if let Err(e) = workspace
                .write_file(&event.path, &content, WriteOptions::default())
                .await
            {
                error!("Failed to apply {}: {}", event.path, e);
                return;
            }
            print_status(workspace);
        }
        FileEventKind::Deleted => {
            warn!(
                "{} was deleted locally; folders are deleted with `xray-beams rm`",
                event.path
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,xray_beams=debug,beams_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate()?;

    let remote = Arc::new(JiraClient::new(&config)?);
    let mut workspace = Workspace::connect(remote, &config.workspace_config())
        .await
        .context("Failed to connect")?;
    workspace.refresh().await.context("Failed to load the test repository")?;

    match &args.command {
        Command::Tree => {
            for path in workspace.feature_files() {
                match workspace.folder_for(&path) {
                    Some(folder) => println!("{}  (folderId: {})", path, folder.id),
                    None => println!("{}", path),
                }
            }
        }
        Command::Show { path } => {
            let mut path = virtual_path(path);
            if workspace.stat(&path)?.kind == EntryKind::Directory {
                path = format!("{}/{}.feature", path, basename(&path));
            }
            let content = workspace.read_file(&path).await?;
            print!("{}", String::from_utf8_lossy(&content));
        }
        Command::Orphans { key: Some(key) } => {
            match workspace.session().scenario_text(key).await? {
                Some(text) => print!("{}", text),
                None => bail!("{} not found", key),
            }
        }
        Command::Orphans { key: None } => {
            for test in workspace.session().orphans().await? {
                println!("{}\t{}", test.key, test.summary);
            }
        }
        Command::Preconditions { key: Some(key) } => {
            match workspace.session().precondition_text(key).await? {
                Some(text) => print!("{}", text),
                None => bail!("{} not found", key),
            }
        }
        Command::Preconditions { key: None } => {
            for pre in workspace.session().preconditions().await? {
                println!("{}\t{}\t{}", pre.key, pre.fields.summary, pre.fields.labels.join(" "));
            }
        }
        Command::Checkout => {
            let checkout = checkout(&args, &config)?;
            let count = checkout.write_all(&mut workspace).await?;
            println!("Checked out {} feature file(s) to {:?}", count, checkout.root());
        }
        Command::Status => {
            let checkout = checkout(&args, &config)?;
            checkout.load_into(&mut workspace).await?;
            print_status(&workspace);
        }
        Command::Commit => {
            let checkout = checkout(&args, &config)?;
            checkout.load_into(&mut workspace).await?;
            match workspace.commit().await {
                Ok(report) => {
                    println!(
                        "created: {:?}\nupdated: {:?}\ndetached: {:?}",
                        report.created, report.updated, report.detached
                    );
                    // New keys show up in the refreshed text
                    checkout.write_all(&mut workspace).await?;
                }
                Err(ReconcileError::Aborted { diagnostics }) => {
                    print_status(&workspace);
                    bail!("Commit aborted: {} parse error(s)", diagnostics.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Watch => {
            let checkout = checkout(&args, &config)?;
            checkout.load_into(&mut workspace).await?;
            print_status(&workspace);

            let mut watcher = FileWatcher::new(
                checkout.root().to_path_buf(),
                Duration::from_millis(config.watch_debounce_ms),
            )?;
            let _subscription = workspace.subscribe(|batch| {
                for event in batch {
                    debug!("{:?} {}", event.kind, event.path);
                }
            });
            info!("Watching {:?}. Press Ctrl+C to stop.", watcher.root());

            loop {
                tokio::select! {
                    Some(event) = watcher.event_rx().recv() => {
                        on_file_event(&mut workspace, &checkout, event).await;
                    }

                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }
        Command::Mkdir { path } => {
            workspace.create_directory(&virtual_path(path)).await?;
        }
        Command::Mv { from, to } => {
            workspace
                .rename(&virtual_path(from), &virtual_path(to), RenameOptions::default())
                .await?;
        }
        Command::Rm { path } => {
            workspace.delete(&virtual_path(path)).await?;
        }
    }

    Ok(())
}
