use super::app::Session;
use super::*;

pub(super) fn handle_settings(session: &Session, args: &SettingsArgs) -> anyhow::Result<()> {
    let store = &session.boot.store;
    let mut settings = session.boot.settings.clone();
    match &args.command {
        SettingsCommands::Show => {}
        SettingsCommands::Set(changes) => {
            if !apply_changes(&mut settings, changes, store.total_ram_mb()) {
                anyhow::bail!("nothing to change; see `winterpack settings set --help`");
            }
            store.save(&settings)?;
            info!(?settings, "settings updated");
        }
        SettingsCommands::ResetAuto => {
            settings.reset_to_auto(store.total_ram_mb());
            store.save(&settings)?;
            info!(memory_mb = settings.memory_mb, "memory reset to automatic");
        }
    }
    let rendered = serde_json::to_string_pretty(&settings).context("serialize settings")?;
    println!("{rendered}");
    println!("Stored in {}", store.path().display());
    Ok(())
}

/// Returns false when `changes` names no setting at all. An explicit memory
/// size turns automatic sizing off unless `--auto-ram` says otherwise.
pub(super) fn apply_changes(
    settings: &mut Settings,
    changes: &SetSettingsArgs,
    total_ram_mb: u64,
) -> bool {
    let mut changed = false;
    if let Some(memory_mb) = changes.memory_mb {
        settings.set_memory_mb(memory_mb);
        if changes.auto_ram.is_none() {
            settings.auto_ram = false;
        }
        changed = true;
    }
    if let Some(auto_ram) = changes.auto_ram {
        if auto_ram {
            settings.reset_to_auto(total_ram_mb);
        } else {
            settings.auto_ram = false;
        }
        changed = true;
    }
    if let Some(dev_builds) = changes.dev_builds {
        settings.dev_builds_enabled = dev_builds;
        changed = true;
    }
    if let Some(debug) = changes.debug {
        settings.debug_enabled = debug;
        changed = true;
    }
    changed
}
