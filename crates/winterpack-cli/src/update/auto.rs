use super::*;

pub struct AutoUpdate<'a> {
    pub platform: &'a dyn Platform,
    pub record: &'a InstallationRecord,
    pub current: &'a Version,
    pub channel: Channel,
    pub interval_secs: u64,
    /// Check even when the interval has not elapsed.
    pub force: bool,
}

/// The launch-time update path. Returns `Ok(None)` when nothing was
/// installed: not due, offline, up to date, or another process holds the
/// update lock.
pub async fn check_and_maybe_apply(
    auto: &AutoUpdate<'_>,
    client: &ReleaseClient,
    downloader: &Downloader,
) -> Result<Option<ApplyOutcome>, UpdateError> {
    let data_dir = &auto.record.data_path;
    let channel = auto.channel.as_str();
    let mut state = UpdateCheckState::load(data_dir);
    let now = current_epoch_seconds();
    if !auto.force && !update_check_due(&state, now, auto.interval_secs) {
        debug!(last_check = ?state.last_check, "update check not due");
        return Ok(None);
    }

    let check = match check_for_update(client, auto.current, auto.channel, CHECK_TIMEOUT).await {
        Ok(check) => check,
        Err(err) => {
            let retryable = err.is_retryable();
            let result = if retryable { "skipped:network" } else { "failed" };
            state.record(now, result, None, channel);
            save_state(&state, data_dir);
            if retryable {
                warn!(error = %err, "update check skipped");
                return Ok(None);
            }
            return Err(err);
        }
    };

    let latest = check.release.version.to_string();
    if !check.is_newer() {
        state.record(now, "up_to_date", Some(latest), channel);
        save_state(&state, data_dir);
        return Ok(None);
    }
    state.record(now, "update_available", Some(latest.clone()), channel);
    save_state(&state, data_dir);

    let lock = UpdateLock::try_acquire(data_dir)
        .map_err(|err| UpdateError::apply(format!("{err:#}")))?;
    let Some(_lock) = lock else {
        info!("another process is updating; skipping");
        return Ok(None);
    };

    let outcome =
        download_and_apply(auto.platform, &auto.record.exe_path, &check.release, downloader)
            .await?;
    state.record(now, "applied", Some(latest), channel);
    save_state(&state, data_dir);
    Ok(Some(outcome))
}

fn save_state(state: &UpdateCheckState, data_dir: &Path) {
    if let Err(err) = state.save(data_dir) {
        warn!(error = %format!("{err:#}"), "could not record update check");
    }
}
