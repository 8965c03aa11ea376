//! Launch ordering: probe the installation, clear what an interrupted
//! update left behind, migrate legacy portable data, and only then load
//! settings from the canonical data directory.

use anyhow::Context;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use winterpack_core::apply::cleanup_leftovers;
use winterpack_core::lockfile::UpdateLock;
use winterpack_core::memory::total_ram_mb;
use winterpack_core::migration::{MigrationReport, MigrationStatus, Migrator};
use winterpack_core::platform::Platform;
use winterpack_core::probe::{InstallationRecord, ProbeContext, probe};
use winterpack_core::settings::{Settings, SettingsStore};

pub struct BootstrapOptions {
    /// Where portable-data backups are written.
    pub backup_root: PathBuf,
    /// Overrides the detected physical memory for the settings defaults.
    pub total_ram_mb: Option<u64>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            backup_root: env::temp_dir(),
            total_ram_mb: None,
        }
    }
}

pub struct Bootstrap {
    pub record: InstallationRecord,
    pub migration: MigrationReport,
    pub store: SettingsStore,
    pub settings: Settings,
}

pub fn bootstrap(
    platform: &dyn Platform,
    ctx: &ProbeContext,
    options: &BootstrapOptions,
) -> anyhow::Result<Bootstrap> {
    let record = probe(platform, ctx)?;
    fs::create_dir_all(&record.data_path)
        .with_context(|| format!("create data directory {}", record.data_path.display()))?;

    let removed = cleanup_leftovers(&record.exe_path);
    if !removed.is_empty() {
        info!(count = removed.len(), "removed leftovers of an interrupted update");
    }

    let migrator =
        Migrator::with_backup_root(&record.root_path, &record.data_path, &options.backup_root);
    let state = migrator.detect();
    let migration = if state.status == MigrationStatus::Pending {
        let _lock = UpdateLock::acquire(&record.data_path)?;
        migrator.run()?
    } else {
        MigrationReport::unchanged(state)
    };

    let total_ram = options.total_ram_mb.unwrap_or_else(total_ram_mb);
    let store = SettingsStore::with_total_ram(&record.data_path, total_ram);
    let settings = store.load()?;
    Ok(Bootstrap {
        record,
        migration,
        store,
        settings,
    })
}
