use super::app::Session;
use super::*;

pub(super) fn handle_status(session: &Session, args: &StatusArgs) -> anyhow::Result<()> {
    let boot = &session.boot;
    let check = UpdateCheckState::load(&boot.record.data_path);
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&status_json(boot, &check)).context("serialize status")?;
        println!("{rendered}");
        return Ok(());
    }

    let record = &boot.record;
    let settings = &boot.settings;
    let migration = &boot.migration.state;
    println!("Version:         {}", current_version());
    println!("Install mode:    {}", record.mode.as_str());
    println!("Executable:      {}", record.exe_path.display());
    let source = if record.data_overridden {
        format!(" (from {DATA_DIR_ENV})")
    } else {
        String::new()
    };
    println!("Data directory:  {}{source}", record.data_path.display());
    match &migration.completed_at {
        Some(at) => println!("Migration:       {} at {at}", migration.status.as_str()),
        None => println!("Migration:       {}", migration.status.as_str()),
    }
    println!(
        "Memory:          {} MB{}",
        settings.memory_mb,
        if settings.auto_ram { " (auto)" } else { "" }
    );
    println!("Update channel:  {}", settings.update_channel().as_str());
    println!(
        "Debug logging:   {}",
        if settings.debug_enabled { "on" } else { "off" }
    );
    match check.last_check {
        Some(at) => println!(
            "Last check:      {} ({}, latest {})",
            format_epoch(at),
            check.last_result.as_deref().unwrap_or("unknown"),
            check.last_version.as_deref().unwrap_or("unknown")
        ),
        None => println!("Last check:      never"),
    }
    Ok(())
}

pub(super) fn status_json(boot: &Bootstrap, check: &UpdateCheckState) -> serde_json::Value {
    let record = &boot.record;
    let migration = &boot.migration.state;
    serde_json::json!({
        "version": current_version().to_string(),
        "mode": record.mode.as_str(),
        "exePath": record.exe_path,
        "dataPath": record.data_path,
        "dataOverridden": record.data_overridden,
        "migration": {
            "status": migration.status.as_str(),
            "backupPath": migration.backup_path,
            "completedAt": migration.completed_at,
        },
        "settings": boot.settings,
        "updateCheck": {
            "lastCheck": check.last_check.map(format_epoch),
            "lastResult": check.last_result,
            "lastVersion": check.last_version,
            "channel": check.last_channel,
        },
    })
}

pub(super) fn handle_migrate(session: &Session) -> anyhow::Result<()> {
    let report = &session.boot.migration;
    println!("Migration status: {}", report.state.status.as_str());
    if report.entries.is_empty() {
        return Ok(());
    }
    println!("Migrated:         {}", report.entries.join(", "));
    println!(
        "Files:            {} copied, {} already present",
        report.copied_files, report.identical_files
    );
    if let Some(backup) = &report.state.backup_path {
        println!("Backup:           {}", backup.display());
    }
    if !report.conflicts.is_empty() {
        println!("Kept existing versions of:");
        for conflict in &report.conflicts {
            println!("  {}", conflict.display());
        }
    }
    Ok(())
}

/// Runs inside the staged binary after the previous process exited, or
/// elevated on behalf of `update`. Unless `--no-relaunch` is given the
/// launcher is restarted whether or not the swap succeeded.
pub(super) fn handle_finish_update(args: &FinishUpdateArgs) -> anyhow::Result<()> {
    let platform = current_platform();
    let result = stage_beside_target(platform.as_ref(), &args.target, &args.staged).and_then(
        |staged| {
            finish_staged_update(
                platform.as_ref(),
                &args.target,
                &staged,
                FinishPolicy::default(),
            )
        },
    );
    if let Err(err) = &result {
        warn!(error = %err, "update hand-off failed; keeping the previous version");
    }
    if !args.no_relaunch {
        if let Err(err) = update::relaunch(&args.target) {
            warn!(error = %format!("{err:#}"), "could not restart launcher");
        }
    }
    result.map_err(Into::into)
}
