use super::*;

/// File name of an update downloaded into the data directory for an
/// elevated `finish-update`.
pub const ELEVATED_DOWNLOAD_NAME: &str = "winterpack.download";

/// Downloads `release` next to `target` and installs it. A failed download
/// or verification leaves `target` untouched and nothing staged.
pub async fn download_and_apply(
    platform: &dyn Platform,
    target: &Path,
    release: &ReleaseInfo,
    downloader: &Downloader,
) -> Result<ApplyOutcome, UpdateError> {
    let mut applier = UpdateApplier::new(platform, target);
    let staging = applier.begin_download()?.to_path_buf();
    info!(
        version = %release.version,
        asset = %release.asset_name,
        "downloading update"
    );

    let report = match downloader
        .fetch(&release.asset_url, release.sha256.as_deref(), &staging)
        .await
    {
        Ok(report) => report,
        Err(err) => {
            applier.abort();
            return Err(err);
        }
    };

    // Without a published digest, pin the staged file to what was downloaded.
    let expected = release.sha256.clone().unwrap_or(report.sha256);
    applier.stage(&staging, Some(&expected))?;
    let outcome = applier.apply()?;
    info!(version = %release.version, ?outcome, "update installed");
    Ok(outcome)
}

/// Downloads and verifies `release` into `data_dir` when the install
/// directory is not writable. Only the promotion then needs elevation.
pub async fn download_for_elevated_finish(
    data_dir: &Path,
    release: &ReleaseInfo,
    downloader: &Downloader,
) -> Result<PathBuf, UpdateError> {
    std::fs::create_dir_all(data_dir).map_err(|err| UpdateError::DownloadFailed {
        attempts: 0,
        cause: format!("create {}: {err}", data_dir.display()),
    })?;
    let dest = data_dir.join(ELEVATED_DOWNLOAD_NAME);
    info!(
        version = %release.version,
        dest = %dest.display(),
        "downloading update for elevated install"
    );
    if let Err(err) = downloader
        .fetch(&release.asset_url, release.sha256.as_deref(), &dest)
        .await
    {
        let _ = std::fs::remove_file(&dest);
        return Err(err);
    }
    Ok(dest)
}
