/// Rebuilds a table under a new record type.
///
/// The source file is renamed to `<path>_backup` before anything else is
/// touched. Records are read back from the backup oldest first, passed
/// through the caller's transform and added to a fresh table, so a sorted
/// table keeps its relative order.
///
/// A failure after the rename is not rolled back: the backup stays in place
/// and the destination may be partially written. Restoring is left to the
/// caller.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::read_options;
use crate::{Error, GetOptions, Options, Record, Result, Table};

/// Parameters for [`migrate`].
pub struct MigrateParams<F> {
    /// Path of the existing table file.
    pub table_path: PathBuf,
    /// Path of the new table file. Defaults to `table_path`.
    pub new_path: Option<PathBuf>,
    /// Turn sorting off in the new table. Irreversible.
    pub disable_sorting: bool,
    /// Keep `<table_path>_backup` after a successful migration.
    pub keep_backup: bool,
    /// Called once per record. `Ok(None)` skips the record, `Err` halts the
    /// migration.
    pub migrate_object: Option<F>,
}

impl<F> MigrateParams<F> {
    /// Migrates `table_path` in place with `migrate_object`.
    pub fn new(table_path: impl Into<PathBuf>, migrate_object: F) -> Self {
        Self {
            table_path: table_path.into(),
            new_path: None,
            disable_sorting: false,
            keep_backup: false,
            migrate_object: Some(migrate_object),
        }
    }
}

/// Outcome of [`migrate`].
#[derive(Debug, Default)]
pub struct MigrationResults {
    pub success: bool,
    /// The failure that stopped the migration.
    pub error: Option<Error>,
    pub entries_migrated: u64,
    pub entries_skipped: u64,
}

/// Path the source table is moved to while migrating.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("_backup");
    PathBuf::from(name)
}

/// Migrates the table at `params.table_path` from `Old` records to `New`
/// records.
///
/// Only needed when the change is incompatible, for example when an
/// existing field changes type or role. Adding or removing fields does not
/// require a migration.
pub fn migrate<Old, New, F>(params: MigrateParams<F>) -> MigrationResults
where
    Old: Record,
    New: Record,
    F: FnMut(Old) -> anyhow::Result<Option<New>>,
{
    let mut results = MigrationResults::default();
    match run::<Old, New, F>(params, &mut results) {
        Ok(()) => {
            info!(
                migrated = results.entries_migrated,
                skipped = results.entries_skipped,
                "migration complete"
            );
            results.success = true;
        }
        Err(e) => {
            error!(error = %e, "migration failed");
            results.error = Some(e);
        }
    }
    results
}

fn run<Old, New, F>(params: MigrateParams<F>, results: &mut MigrationResults) -> Result<()>
where
    Old: Record,
    New: Record,
    F: FnMut(Old) -> anyhow::Result<Option<New>>,
{
    if params.table_path.as_os_str().is_empty() {
        return Err(Error::MissingRequiredValue("table_path"));
    }
    let Some(mut transform) = params.migrate_object else {
        return Err(Error::MissingRequiredValue("migrate_object"));
    };
    let source = params.table_path;
    if !source.exists() {
        return Err(Error::TablePathNotFound(source));
    }
    let backup = backup_path(&source);
    if backup.exists() {
        return Err(Error::BackupExists(backup));
    }
    let destination = params.new_path.unwrap_or_else(|| source.clone());

    fs::rename(&source, &backup)?;

    let old_options = read_options(&backup)?;
    let old = Table::<Old>::open(&backup, old_options, true)?;

    let new_options = Options {
        disable_sorting: old_options.disable_sorting || params.disable_sorting,
    };
    let new = Table::<New>::open(&destination, new_options, true)?;

    let order = if old_options.disable_sorting {
        GetOptions::default()
    } else {
        GetOptions::sorted(true)
    };
    let entries = old.start_read(|tx| tx.get_all(order))?;

    new.start_write(|tx| {
        for entry in entries.into_iter().rev() {
            match transform(entry).map_err(Error::Transform)? {
                Some(record) => {
                    tx.add(&record)?;
                    results.entries_migrated += 1;
                }
                None => results.entries_skipped += 1,
            }
        }
        Ok(())
    })?;

    old.close();
    new.close();

    if !params.keep_backup {
        fs::remove_file(&backup)?;
    }
    Ok(())
}
