use super::app::Session;
use super::*;

pub(super) async fn handle_update(session: &Session, args: &UpdateArgs) -> anyhow::Result<()> {
    let boot = &session.boot;
    let data_dir = &boot.record.data_path;
    let current = current_version();
    let channel = boot.settings.update_channel();
    let client = ReleaseClient::from_env()?;

    let mut state = UpdateCheckState::load(data_dir);
    let now = current_epoch_seconds();
    let check =
        match update::check_for_update(&client, &current, channel, update::CHECK_TIMEOUT).await {
            Ok(check) => check,
            Err(err) => {
                state.record(now, "failed", None, channel.as_str());
                save_state(&state, data_dir);
                return Err(err.into());
            }
        };
    let latest = check.release.version.to_string();
    let result = if check.is_newer() {
        "update_available"
    } else {
        "up_to_date"
    };
    state.record(now, result, Some(latest.clone()), channel.as_str());
    save_state(&state, data_dir);

    println!("Current version: {current}");
    println!("Latest {} release: {latest}", channel.as_str());
    if !check.is_newer() && !args.force {
        println!("Winterpack is up to date.");
        return Ok(());
    }
    if args.check {
        if check.is_newer() {
            println!("Update available: {current} -> {latest}");
        }
        return Ok(());
    }
    if !args.yes {
        if !is_interactive() {
            anyhow::bail!("refusing to install {latest} without confirmation; pass --yes");
        }
        if !confirm(&format!("Install Winterpack {latest}?"))? {
            println!("Update cancelled.");
            return Ok(());
        }
    }

    let lock = UpdateLock::try_acquire(data_dir)?
        .context("another Winterpack process is already updating")?;
    let downloader = Downloader::new()?;
    let result = update::download_and_apply(
        session.platform.as_ref(),
        &boot.record.exe_path,
        &check.release,
        &downloader,
    )
    .await;
    if let Err(UpdateError::ElevationRequired { .. }) = &result {
        if update::confirm_elevation("install the update").context("escalate update")? {
            let platform = session.platform.as_ref();
            let staged =
                update::download_for_elevated_finish(data_dir, &check.release, &downloader).await?;
            if update::run_elevated_finish(platform, &boot.record.exe_path, &staged)
                .context("escalate update")?
            {
                if !platform.replaces_running_executable() {
                    println!("Update to {latest} finishes as soon as this window closes.");
                    return Ok(());
                }
                state.record(now, "applied", Some(latest.clone()), channel.as_str());
                save_state(&state, data_dir);
                println!("Updated to {latest}. Restart Winterpack to use the new version.");
                return Ok(());
            }
            let _ = std::fs::remove_file(&staged);
        }
    }
    drop(lock);

    match result {
        Ok(ApplyOutcome::AppliedInPlace { .. }) => {
            state.record(now, "applied", Some(latest.clone()), channel.as_str());
            save_state(&state, data_dir);
            println!("Updated to {latest}. Restart Winterpack to use the new version.");
            Ok(())
        }
        Ok(ApplyOutcome::StagedForExternalRestart { staged, target }) => {
            update::spawn_finish_helper(&staged, &target)?;
            println!("Update to {latest} finishes as soon as this window closes.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn save_state(state: &UpdateCheckState, data_dir: &std::path::Path) {
    if let Err(err) = state.save(data_dir) {
        warn!(error = %format!("{err:#}"), "could not record update check");
    }
}
