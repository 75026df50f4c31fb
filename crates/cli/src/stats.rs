/// `ds stats`: counts and schema of a table file.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use engine::bucket;
use redb::{Database, ReadTransaction, ReadableTableMetadata, TableDefinition, TableHandle};
use serde::Serialize;

const USAGE: &str = "\
Usage: ds stats <path> [options]

Options:
  -j, --json    Print a single JSON object
  -h, --help    Print this help
";

/// What `ds stats` reports.
#[derive(Debug, Default, Serialize)]
pub struct Stats {
    /// Records in the data bucket.
    pub entry_count: u64,
    /// Entries across all index buckets.
    pub index_count: u64,
    /// Entries across all unique buckets.
    pub unique_count: u64,
    pub name: String,
    pub primary_key: String,
    pub indexes: Vec<String>,
    pub uniques: Vec<String>,
    pub last_insert_index: u64,
    /// File size in bytes.
    pub size: u64,
}

fn bucket_len(txn: &ReadTransaction, name: &str) -> Result<u64> {
    let table = txn.open_table(TableDefinition::<&'static [u8], &'static [u8]>::new(name))?;
    Ok(table.len()?)
}

/// Reads the stats of the table at `path`.
pub fn collect(path: &Path) -> Result<Stats> {
    let config = engine::read_config(path)
        .with_context(|| format!("reading table config of {}", path.display()))?;

    let mut stats = Stats {
        name: config.name,
        primary_key: config.primary_key,
        indexes: config.indexes,
        uniques: config.uniques,
        last_insert_index: config.last_insert_index,
        size: fs::metadata(path)?.len(),
        ..Stats::default()
    };

    let db = Database::open(path)?;
    let txn = db.begin_read()?;
    let names: Vec<String> = txn.list_tables()?.map(|t| t.name().to_string()).collect();
    for name in names {
        let count = bucket_len(&txn, &name)?;
        if name == bucket::DATA {
            stats.entry_count = count;
        } else if name.starts_with(bucket::INDEX_PREFIX) {
            stats.index_count += count;
        } else if name.starts_with(bucket::UNIQUE_PREFIX) {
            stats.unique_count += count;
        }
    }

    Ok(stats)
}

fn print_text(stats: &Stats) {
    println!("Total entries: {}", stats.entry_count);
    println!("Total indexes: {}", stats.index_count);
    println!("Total unique indexes: {}", stats.unique_count);
    println!("Name: {}", stats.name);
    println!("Primary key field: {}", stats.primary_key);
    println!("Indexed fields: [{}]", stats.indexes.join(", "));
    println!("Unique fields: [{}]", stats.uniques.join(", "));
    println!("Last insert index: {}", stats.last_insert_index);
    println!("Store size: {}", stats.size);
}

pub fn run(args: &[String]) -> Result<()> {
    let mut path: Option<PathBuf> = None;
    let mut json = false;

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{USAGE}");
                return Ok(());
            }
            "-j" | "--json" => json = true,
            other => path = Some(PathBuf::from(other)),
        }
    }

    let Some(path) = path else {
        bail!("missing table path\n\n{USAGE}");
    };
    if !path.exists() {
        bail!("{} file not found or accessible", path.display());
    }

    let stats = collect(&path)?;
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        print_text(&stats);
    }
    Ok(())
}
