//! Garden - publish a folder of notes to a git-backed site repository
//!
//! The `garden` command compares local notes with the repository through its
//! HTTP API and publishes changes, either as one commit per file or as a
//! single atomic commit for many files.
//!
//! ## Commands
//!
//! - `status`: Show unpublished, published, changed and deleted notes
//! - `publish`: Publish notes as one commit
//! - `publish-file`: Publish one note through the contents API
//! - `delete` / `prune`: Remove notes from the repository
//! - `diff`: Compare a note with its published version
//! - `hash`: Print the git blob hash of a file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use garden_core::obs::OperationSpan;
use garden_core::{
    blob_hash, unified_diff, BatchCommitBuilder, Corpus, DiffStats, FsCorpus, GardenConfig,
    LocalDocument, PublishStatus, SingleFilePublisher, StatusReconciler,
};
use garden_remote::{ObjectHash, RemoteStore};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "garden")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish a folder of notes to a git-backed site repository", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// JSON settings file (default: read GARDEN_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the note corpus
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the publish status of every note
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish notes as a single commit
    ///
    /// Without paths, every unpublished and changed note is published.
    Publish {
        /// Corpus paths to publish
        paths: Vec<String>,
    },

    /// Publish one note through the contents API
    PublishFile {
        /// Corpus path of the note
        path: String,
    },

    /// Delete one note from the repository
    Delete {
        /// Corpus path of the note
        path: String,

        /// Current blob hash on the remote (looked up when omitted)
        #[arg(long)]
        hash: Option<String>,
    },

    /// Delete every remote note that no longer exists locally
    Prune,

    /// Show a unified diff from the published note to the local one
    Diff {
        /// Corpus path of the note
        path: String,
    },

    /// Print the git blob hash of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

/// Everything a remote command needs, built once per invocation.
struct Session {
    config: GardenConfig,
    store: Arc<dyn RemoteStore>,
    corpus: Arc<dyn Corpus>,
}

impl Session {
    fn open(config_path: Option<&Path>, root: &Path) -> Result<Self> {
        let config = match config_path {
            Some(path) => GardenConfig::from_file(path)?,
            None => GardenConfig::from_env()?,
        };
        let store = config.connect().context("Failed to set up repository client")?;
        let corpus = FsCorpus::new(root)
            .with_context(|| format!("Cannot open note folder {}", root.display()))?;
        Ok(Self {
            config,
            store: Arc::new(store),
            corpus: Arc::new(corpus),
        })
    }

    fn reconciler(&self) -> StatusReconciler {
        StatusReconciler::new(self.store.clone(), self.corpus.clone(), self.config.clone())
    }

    fn publisher(&self) -> Result<SingleFilePublisher> {
        Ok(SingleFilePublisher::new(self.store.clone(), self.config.clone())?)
    }

    fn document(&self, path: &str) -> LocalDocument {
        LocalDocument::new(path, self.corpus.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    garden_core::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Hash { file } => cmd_hash(&file),
        command => {
            let session = Session::open(cli.config.as_deref(), &cli.root)?;
            let _span =
                OperationSpan::enter(command_name(&command), &session.config.repository_name());
            run(&session, command).await
        }
    }
}

async fn run(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Status { json } => cmd_status(session, json).await,
        Commands::Publish { paths } => cmd_publish(session, &paths).await,
        Commands::PublishFile { path } => cmd_publish_file(session, &path).await,
        Commands::Delete { path, hash } => cmd_delete(session, &path, hash.as_deref()).await,
        Commands::Prune => cmd_prune(session).await,
        Commands::Diff { path } => cmd_diff(session, &path).await,
        Commands::Hash { file } => cmd_hash(&file),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Status { .. } => "status",
        Commands::Publish { .. } => "publish",
        Commands::PublishFile { .. } => "publish-file",
        Commands::Delete { .. } => "delete",
        Commands::Prune => "prune",
        Commands::Diff { .. } => "diff",
        Commands::Hash { .. } => "hash",
    }
}

fn print_status(status: &PublishStatus) {
    let sections: [(&str, Vec<&str>); 3] = [
        (
            "Unpublished",
            status.unpublished.iter().map(|d| d.path()).collect(),
        ),
        ("Changed", status.changed.iter().map(|d| d.path()).collect()),
        (
            "Deleted",
            status.deleted.iter().map(|d| d.path.as_str()).collect(),
        ),
    ];

    for (title, paths) in sections {
        if paths.is_empty() {
            continue;
        }
        println!("{} ({}):", title, paths.len());
        for path in paths {
            println!("  {}", path);
        }
        println!();
    }
    println!("Published: {}", status.published.len());
}

/// Show the publish status
async fn cmd_status(session: &Session, json: bool) -> Result<()> {
    let status = session
        .reconciler()
        .publish_status()
        .await
        .context("Failed to compute publish status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status.summary())?);
    } else {
        print_status(&status);
    }
    Ok(())
}

/// Publish notes in one commit
async fn cmd_publish(session: &Session, paths: &[String]) -> Result<()> {
    let documents = if paths.is_empty() {
        session
            .reconciler()
            .publish_status()
            .await
            .context("Failed to compute publish status")?
            .pending()
    } else {
        paths.iter().map(|p| session.document(p)).collect()
    };

    if documents.is_empty() {
        println!("Nothing to publish");
        return Ok(());
    }

    let builder = BatchCommitBuilder::new(session.store.clone(), session.config.clone())?;
    let report = builder
        .publish_batch(&documents)
        .await
        .context("Batch publish failed")?;

    let Some(commit) = &report.commit else {
        println!("Nothing eligible to publish");
        return Ok(());
    };
    println!(
        "Published {} note(s) to {} at {}",
        report.published.len(),
        report.branch.as_deref().unwrap_or("?"),
        commit.short()
    );
    for published in &report.published {
        println!("  {} {}", published.hash.short(), published.path);
    }
    if !report.skipped.is_empty() {
        println!("Skipped {} note(s):", report.skipped.len());
        for path in &report.skipped {
            println!("  {}", path);
        }
    }
    Ok(())
}

/// Publish one note via the contents API
async fn cmd_publish_file(session: &Session, path: &str) -> Result<()> {
    let outcome = session
        .publisher()?
        .publish(&session.document(path))
        .await
        .with_context(|| format!("Failed to publish {}", path))?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

/// Delete one note
async fn cmd_delete(session: &Session, path: &str, hash: Option<&str>) -> Result<()> {
    let hash = hash
        .map(|h| h.parse::<ObjectHash>())
        .transpose()
        .context("--hash must be a 40 character hex object id")?;

    session
        .publisher()?
        .delete_note(path, hash)
        .await
        .with_context(|| format!("Failed to delete {}", path))?;

    println!("Deleted {}", path);
    Ok(())
}

/// Delete every note that exists only on the remote
async fn cmd_prune(session: &Session) -> Result<()> {
    let status = session
        .reconciler()
        .publish_status()
        .await
        .context("Failed to compute publish status")?;
    if status.deleted.is_empty() {
        println!("Nothing to prune");
        return Ok(());
    }

    let publisher = session.publisher()?;
    let mut failed = 0;
    for gone in &status.deleted {
        match publisher.delete_note(&gone.path, Some(gone.hash.clone())).await {
            Ok(()) => println!("Deleted {}", gone.path),
            Err(e) => {
                warn!(path = %gone.path, error = %e, "delete failed");
                eprintln!("Failed to delete {}: {}", gone.path, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} deletions failed", failed, status.deleted.len());
    }
    info!(count = status.deleted.len(), "pruned");
    Ok(())
}

/// Diff the published version of a note against the local one
async fn cmd_diff(session: &Session, path: &str) -> Result<()> {
    let remote = session
        .publisher()?
        .remote_content(path)
        .await
        .with_context(|| format!("Failed to fetch published {}", path))?;
    let local = session
        .corpus
        .read(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    let diff = unified_diff(path, &remote, &local);
    if diff.is_empty() {
        println!("No changes");
        return Ok(());
    }
    let stats = DiffStats::between(&remote, &local);
    print!("{}", diff);
    println!("{} insertion(s), {} deletion(s)", stats.insertions, stats.deletions);
    Ok(())
}

/// Print the git blob hash of a file
fn cmd_hash(file: &Path) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", blob_hash(&bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_core::collect_publishable;
    use garden_remote::fakes::{MemoryRemoteStore, RemoteOp};

    fn session(dir: &Path, store: Arc<MemoryRemoteStore>) -> Session {
        Session {
            config: GardenConfig::new("alice", "garden", "t").with_note_path_base("notes/"),
            store,
            corpus: Arc::new(FsCorpus::new(dir).unwrap()),
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["garden", "status", "--json", "--root", "/tmp/notes", "-v"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.root, PathBuf::from("/tmp/notes"));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }

    #[test]
    fn parses_delete_with_hash() {
        let cli = Cli::try_parse_from(["garden", "delete", "a.md", "--hash", "abc"]).unwrap();
        match cli.command {
            Commands::Delete { path, hash } => {
                assert_eq!(path, "a.md");
                assert_eq!(hash.as_deref(), Some("abc"));
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn hash_command_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "hello world\n").unwrap();
        assert!(cmd_hash(&file).is_ok());
        assert!(cmd_hash(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn publish_then_prune() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        let store = Arc::new(MemoryRemoteStore::new());
        store.seed_file("notes/old.md", "old");
        let session = session(dir.path(), store.clone());

        cmd_publish(&session, &[]).await.unwrap();
        assert_eq!(store.file_content("notes/a.md").as_deref(), Some("a"));
        assert_eq!(store.call_count(RemoteOp::UpdateRef), 1);

        cmd_prune(&session).await.unwrap();
        assert!(store.file_content("notes/old.md").is_none());

        let status = session.reconciler().publish_status().await.unwrap();
        assert!(status.is_clean());
        let local = collect_publishable(session.corpus.clone(), &session.config)
            .await
            .unwrap();
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn delete_rejects_bad_hash() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), Arc::new(MemoryRemoteStore::new()));
        assert!(cmd_delete(&session, "a.md", Some("zz")).await.is_err());
    }
}
