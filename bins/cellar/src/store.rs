use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use cellar_db::{PersistentStorage, SchemaProvider, StorageConfigurationManager};
use clap::{Args as ClapArgs, Subcommand, ValueEnum};

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, ClapArgs)]
pub struct Command {
    /// Path to the JSON storage manifest
    #[clap(long, short = 'm')]
    pub manifest: PathBuf,

    #[clap(subcommand)]
    pub verb: Verb,
}

#[derive(Debug, Subcommand)]
pub enum Verb {
    /// List namespaces declared in the manifest
    List,
    /// Create a namespace's store if it does not exist
    Create(Target),
    /// Open a store, verify its version stamps and close it again
    Verify(Target),
    /// Print a store's column families, versions and sequences
    Show(Show),
}

#[derive(Debug, ClapArgs)]
pub struct Target {
    /// Namespace to operate on
    pub namespace: String,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Tab-separated values
    Tsv,
    /// Formatted table with aligned columns (default)
    #[default]
    Table,
}

#[derive(Debug, ClapArgs)]
pub struct Show {
    /// Namespace to inspect
    pub namespace: String,

    /// Output format
    #[clap(long, short = 'f', value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Run a store command and return the process exit code.
pub fn run(cmd: &Command) -> i32 {
    trace!("Running command: {:?}", cmd);

    let manager = match StorageConfigurationManager::from_file(&cmd.manifest)
        .with_context(|| format!("loading manifest {}", cmd.manifest.display()))
    {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            eprintln!("error: {e:#}");
            return 2;
        }
    };

    let result = match &cmd.verb {
        Verb::List => {
            run_list(&manager);
            Ok(())
        }
        Verb::Create(target) => run_create(manager, &target.namespace),
        Verb::Verify(target) => run_verify(manager, &target.namespace),
        Verb::Show(args) => run_show(manager, args),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_list(manager: &StorageConfigurationManager) {
    for name in manager.namespace_names() {
        println!("{}\t{}", name, manager.storage_path(name).display());
    }
}

/// Turn a failed boundary call into an error carrying the swallowed reason.
fn check(ok: bool, op: &str, storage: &PersistentStorage) -> anyhow::Result<()> {
    if ok {
        return Ok(());
    }
    match storage.last_error() {
        Some(e) => anyhow::bail!("{} `{}` failed: {:#}", op, storage.namespace(), e),
        None => anyhow::bail!("{} `{}` failed", op, storage.namespace()),
    }
}

fn run_create(manager: Arc<StorageConfigurationManager>, namespace: &str) -> anyhow::Result<()> {
    let mut storage = PersistentStorage::new(namespace, manager);
    let ok = storage.create();
    check(ok, "create", &storage)?;
    println!("created\t{}\t{}", namespace, storage.path().display());
    Ok(())
}

fn run_verify(manager: Arc<StorageConfigurationManager>, namespace: &str) -> anyhow::Result<()> {
    let mut storage = PersistentStorage::new(namespace, manager);
    let ok = storage.open();
    check(ok, "open", &storage)?;
    let ok = storage.close();
    check(ok, "close", &storage)?;
    println!("ok\t{}", namespace);
    Ok(())
}

fn run_show(manager: Arc<StorageConfigurationManager>, args: &Show) -> anyhow::Result<()> {
    let mut storage = PersistentStorage::new(&args.namespace, manager);
    let ok = storage.open();
    check(ok, "open", &storage)?;

    let mut rows: Vec<(&str, String, String)> = Vec::new();
    for cf in storage.column_families() {
        rows.push(("column_family", cf.clone(), String::new()));
    }
    for (key, version) in storage.versions() {
        rows.push(("version", key.clone(), version.to_string()));
    }
    for (key, value) in storage.sequences() {
        rows.push(("sequence", key.clone(), value.to_string()));
    }

    match args.format {
        OutputFormat::Tsv => {
            for (kind, name, value) in &rows {
                println!("{}\t{}\t{}", kind, name, value);
            }
        }
        OutputFormat::Table => {
            let name_width = rows
                .iter()
                .map(|(_, name, _)| name.len())
                .max()
                .unwrap_or(0)
                .max("NAME".len());
            println!("{:<13}  {:<name_width$}  VALUE", "KIND", "NAME");
            for (kind, name, value) in &rows {
                println!("{:<13}  {:<name_width$}  {}", kind, name, value);
            }
        }
    }

    let ok = storage.close();
    check(ok, "close", &storage)
}
