use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tripguard_core::paths;
use tripguard_core::{FilesetName, RecordEngine, Settings, SignatureEngine, Store};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "TRIPGUARD_PASSWORD";

#[derive(Parser)]
#[command(name = "tripguard", version)]
#[command(about = "Record file attributes and detect changes against the baseline", long_about = None)]
struct Cli {
    /// Baseline database (default: $TRIPGUARD_DB or the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a baseline for files and directories
    Add {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
        /// Descend into directories
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        recursive: bool,
        /// Replace existing baselines
        #[arg(long, conflicts_with = "skip")]
        overwrite: bool,
        /// Leave existing baselines untouched
        #[arg(long)]
        skip: bool,
        /// Comma separated checks for files
        #[arg(long)]
        filechecks: Option<String>,
        /// Comma separated checks for directories
        #[arg(long)]
        dirchecks: Option<String>,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove baselines for paths and everything below them
    Delete {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Compare the filesystem with the baseline
    Verify {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
        /// Limit verification to these paths and their descendants
        paths: Vec<PathBuf>,
    },

    /// Print every baseline of a fileset
    List {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
    },

    /// Delete a fileset
    Deleteset {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
    },

    /// Copy a fileset to a new name
    Copyset {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
        target: FilesetName,
    },

    /// Print the names of all filesets
    Listsets,

    /// Seal a fileset with a password
    Sign {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
        /// Replace an existing signature
        #[arg(long)]
        overwrite: bool,
    },

    /// Check a fileset against its signature
    Verifysig {
        #[arg(long, default_value = "default")]
        fileset: FilesetName,
    },
}

impl Commands {
    fn writes(&self) -> bool {
        matches!(
            self,
            Commands::Add { .. }
                | Commands::Delete { .. }
                | Commands::Deleteset { .. }
                | Commands::Copyset { .. }
                | Commands::Sign { .. }
        )
    }

    fn needs_password(&self) -> bool {
        matches!(self, Commands::Sign { .. } | Commands::Verifysig { .. })
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    let settings_path = paths::settings_path()?;
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("load settings {}", settings_path.display()))?;
    let db = match cli.db {
        Some(path) => path,
        None => paths::default_db_path()?,
    };

    let password = if cli.command.needs_password() {
        Some(read_password("Password: ")?)
    } else {
        None
    };

    let mut store =
        Store::open(&db).with_context(|| format!("open database {}", db.display()))?;
    let write = cli.command.writes();
    store.begin(write)?;

    let outcome = run(&store, &settings, cli.command, password.as_deref().map(String::as_str));
    let finish = if write && outcome.is_ok() {
        store.commit().context("commit")
    } else {
        store.rollback().context("rollback")
    };
    let closed = store.close().map_err(|(_, e)| anyhow!("close database: {e}"));

    let clean = outcome?;
    finish?;
    closed?;
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs one command inside the open transaction. `Ok(false)` means the
/// command completed but found failed checks.
fn run(
    store: &Store,
    settings: &Settings,
    command: Commands,
    password: Option<&str>,
) -> Result<bool> {
    let engine = RecordEngine::default();
    let signer = SignatureEngine::new(settings.kdf);

    match command {
        Commands::Add {
            fileset,
            recursive,
            overwrite,
            skip,
            filechecks,
            dirchecks,
            paths,
        } => {
            let mut opts = engine.options(
                fileset,
                filechecks.as_deref().unwrap_or(&settings.file_checks),
                dirchecks.as_deref().unwrap_or(&settings.dir_checks),
            )?;
            opts.recursive = recursive;
            opts.overwrite = overwrite;
            opts.skip = skip;
            engine
                .add_files(store, &paths, &opts)
                .with_context(|| format!("add files to {}", opts.fileset))?;
        }
        Commands::Delete { fileset, paths } => {
            engine
                .delete_files(store, &paths, &fileset)
                .with_context(|| format!("delete files from {fileset}"))?;
        }
        Commands::Verify { fileset, paths } => {
            let report = engine
                .verify_files(store, &paths, &fileset)
                .with_context(|| format!("verify fileset {fileset}"))?;
            println!("{} failed checks", report.failure_count());
            return Ok(report.is_clean());
        }
        Commands::List { fileset } => {
            for entry in engine.list(store, &fileset)? {
                println!("{}:{}", entry.path, serde_json::to_string(&entry.record)?);
            }
        }
        Commands::Deleteset { fileset } => {
            engine
                .delete_fileset(store, &fileset)
                .with_context(|| format!("delete fileset {fileset}"))?;
        }
        Commands::Copyset { fileset, target } => {
            engine
                .copy_fileset(store, &fileset, &target)
                .with_context(|| format!("copy fileset {fileset} to {target}"))?;
        }
        Commands::Listsets => {
            for name in engine.list_filesets(store)? {
                println!("{name}");
            }
        }
        Commands::Sign { fileset, overwrite } => {
            let password = password.ok_or_else(|| anyhow!("password required"))?;
            signer
                .sign(store, &fileset, password, overwrite)
                .with_context(|| format!("sign fileset {fileset}"))?;
        }
        Commands::Verifysig { fileset } => {
            let password = password.ok_or_else(|| anyhow!("password required"))?;
            signer
                .verify(store, &fileset, password)
                .with_context(|| format!("verify fileset {fileset} signature"))?;
            info!(fileset = %fileset, "signature ok");
        }
    }
    Ok(true)
}

fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    let raw = match std::env::var(PASSWORD_ENV) {
        Ok(pw) if !pw.is_empty() => Zeroizing::new(pw),
        _ => Zeroizing::new(
            rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?,
        ),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("password must not be empty"));
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}
