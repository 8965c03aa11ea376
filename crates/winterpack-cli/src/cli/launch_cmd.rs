use super::app::Session;
use super::*;

pub(super) async fn handle_launch(session: &Session, args: &LaunchArgs) -> anyhow::Result<()> {
    let boot = &session.boot;
    if !args.skip_update_check
        && let Some(outcome) = launch_update(session, args.force_update_check).await
    {
        match outcome {
            ApplyOutcome::AppliedInPlace { target } => {
                println!("Update installed, restarting.");
                update::restart_current_process(&target)
                    .context("restart after update apply")?;
                return Ok(());
            }
            ApplyOutcome::StagedForExternalRestart { staged, target } => {
                update::spawn_finish_helper(&staged, &target)?;
                println!("Update downloaded. Winterpack restarts once it has been installed.");
                return Ok(());
            }
        }
    }

    let settings = &boot.settings;
    println!(
        "Winterpack {} ready ({} install, {} channel)",
        current_version(),
        boot.record.mode.as_str(),
        settings.update_channel().as_str()
    );
    println!("Data directory: {}", boot.record.data_path.display());
    println!(
        "Game memory: {} MB{}",
        settings.memory_mb,
        if settings.auto_ram { " (auto)" } else { "" }
    );
    Ok(())
}

/// Scheduled update on start. Failures are reported but never stop the
/// launch.
async fn launch_update(session: &Session, force: bool) -> Option<ApplyOutcome> {
    let boot = &session.boot;
    let clients = ReleaseClient::from_env().and_then(|client| Ok((client, Downloader::new()?)));
    let (client, downloader) = match clients {
        Ok(clients) => clients,
        Err(err) => {
            warn!(error = %err, "update check unavailable");
            return None;
        }
    };
    let current = current_version();
    let auto = update::AutoUpdate {
        platform: session.platform.as_ref(),
        record: &boot.record,
        current: &current,
        channel: boot.settings.update_channel(),
        interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
        force,
    };
    match update::check_and_maybe_apply(&auto, &client, &downloader).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "automatic update failed");
            eprintln!("Automatic update failed: {err}");
            if let Some(hint) = update::user_hint(&err) {
                eprintln!("{hint}");
            }
            None
        }
    }
}
