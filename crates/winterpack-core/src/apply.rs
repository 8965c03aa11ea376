//! Replacing the running executable with a verified download.
//!
//! ```text
//! Idle -> Downloading -> Verifying -> Staged -> Applying -> Applied
//!                                                  \-> RolledBack
//! ```
//!
//! Any failure before `Applying` returns the applier to `Idle` with the
//! staged file removed. The target executable is only ever touched by a
//! single rename, so it is either the old binary or the new one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{UpdateError, is_permission_denied};
use crate::fs_util::{normalize_sha256, sha256_file};
use crate::platform::{Platform, parked_path, staged_path};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyPhase {
    Idle,
    Downloading,
    Verifying,
    Staged,
    Applying,
    Applied,
    RolledBack,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The target now holds the new binary; a restart picks it up.
    AppliedInPlace { target: PathBuf },
    /// The OS will not let a running executable be replaced. The caller has
    /// to start the hand-off helper and exit so it can finish the swap.
    StagedForExternalRestart { staged: PathBuf, target: PathBuf },
}

pub struct UpdateApplier<'a> {
    platform: &'a dyn Platform,
    target: PathBuf,
    staged: PathBuf,
    phase: ApplyPhase,
}

impl<'a> UpdateApplier<'a> {
    pub fn new(platform: &'a dyn Platform, target: &Path) -> Self {
        Self {
            platform,
            target: target.to_path_buf(),
            staged: staged_path(target),
            phase: ApplyPhase::Idle,
        }
    }

    pub fn phase(&self) -> ApplyPhase {
        self.phase
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Where the download should land: beside the target, on the same
    /// filesystem, so promotion is a plain rename.
    pub fn staging_path(&self) -> &Path {
        &self.staged
    }

    pub fn begin_download(&mut self) -> Result<&Path, UpdateError> {
        self.expect_phase(ApplyPhase::Idle)?;
        self.phase = ApplyPhase::Downloading;
        Ok(&self.staged)
    }

    /// Marks the download as failed and drops whatever was staged.
    pub fn abort(&mut self) {
        self.discard_staged();
        self.phase = ApplyPhase::Idle;
    }

    /// Verifies `downloaded` and stages it next to the target with the
    /// target's executable attributes. On any error the applier is back in
    /// `Idle` and nothing is left beside the target.
    pub fn stage(
        &mut self,
        downloaded: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<&Path, UpdateError> {
        if self.phase == ApplyPhase::Idle {
            self.phase = ApplyPhase::Downloading;
        }
        self.expect_phase(ApplyPhase::Downloading)?;
        self.phase = ApplyPhase::Verifying;
        match self.verify_and_stage(downloaded, expected_sha256) {
            Ok(()) => {
                self.phase = ApplyPhase::Staged;
                info!(staged = %self.staged.display(), "update staged");
                Ok(&self.staged)
            }
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    fn verify_and_stage(
        &self,
        downloaded: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<(), UpdateError> {
        let size = fs::metadata(downloaded)
            .map_err(|err| UpdateError::verification(format!("read {}: {err}", downloaded.display())))?
            .len();
        if size == 0 {
            return Err(UpdateError::verification("downloaded artifact is empty"));
        }
        if let Some(expected) = expected_sha256 {
            let actual = sha256_file(downloaded)
                .map_err(|err| UpdateError::verification(format!("hash {}: {err}", downloaded.display())))?;
            let expected = normalize_sha256(expected);
            if actual != expected {
                return Err(UpdateError::verification(format!(
                    "sha256 mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        if downloaded != self.staged {
            fs::copy(downloaded, &self.staged)
                .map_err(|err| io_failure("stage update at", &self.staged, err))?;
        }
        self.platform
            .set_executable_attributes(&self.target, &self.staged)
            .map_err(|err| io_failure("set executable attributes on", &self.staged, err))?;
        self.platform.clear_download_attributes(&self.staged);
        Ok(())
    }

    /// Promotes the staged artifact, or hands it off where the OS forbids
    /// replacing a running executable.
    pub fn apply(&mut self) -> Result<ApplyOutcome, UpdateError> {
        self.expect_phase(ApplyPhase::Staged)?;
        if !self.platform.replaces_running_executable() {
            info!(
                staged = %self.staged.display(),
                target = %self.target.display(),
                "executable is locked while running, deferring swap to restart helper"
            );
            return Ok(ApplyOutcome::StagedForExternalRestart {
                staged: self.staged.clone(),
                target: self.target.clone(),
            });
        }

        self.phase = ApplyPhase::Applying;
        match self.platform.promote(&self.staged, &self.target) {
            Ok(()) => {
                self.phase = ApplyPhase::Applied;
                info!(target = %self.target.display(), "update applied");
                Ok(ApplyOutcome::AppliedInPlace {
                    target: self.target.clone(),
                })
            }
            Err(err) => {
                warn!(error = %err, target = %self.target.display(), "promotion failed, rolling back");
                self.discard_staged();
                self.phase = ApplyPhase::RolledBack;
                Err(io_failure("replace", &self.target, err))
            }
        }
    }

    fn expect_phase(&self, expected: ApplyPhase) -> Result<(), UpdateError> {
        if self.phase == expected {
            return Ok(());
        }
        Err(UpdateError::apply(format!(
            "update is {:?}, expected {:?}",
            self.phase, expected
        )))
    }

    fn discard_staged(&self) {
        match fs::remove_file(&self.staged) {
            Ok(()) => debug!(path = %self.staged.display(), "removed staged update"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(error = %err, path = %self.staged.display(), "could not remove staged update"),
        }
    }
}

fn io_failure(action: &str, path: &Path, err: io::Error) -> UpdateError {
    if is_permission_denied(&err) {
        let dir = path.parent().unwrap_or(path).to_path_buf();
        return UpdateError::ElevationRequired { path: dir };
    }
    UpdateError::apply(format!("{action} {}: {err}", path.display()))
}

/// Retry policy of the restart helper while it waits for the previous
/// process to let go of the target.
#[derive(Clone, Copy, Debug)]
pub struct FinishPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for FinishPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run by the restart helper: swaps `staged` over `target` once the old
/// process is gone. If the swap never succeeds the staged file is removed
/// and the old executable stays in place.
pub fn finish_staged_update(
    platform: &dyn Platform,
    target: &Path,
    staged: &Path,
    policy: FinishPolicy,
) -> Result<(), UpdateError> {
    if !staged.is_file() {
        return Err(UpdateError::apply(format!(
            "staged update {} is missing",
            staged.display()
        )));
    }
    let attempts = policy.attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match platform.promote(staged, target) {
            Ok(()) => {
                info!(target = %target.display(), attempt, "staged update promoted");
                return Ok(());
            }
            Err(err) => {
                debug!(error = %err, attempt, "target still busy");
                last_error = Some(err);
                if attempt < attempts {
                    thread::sleep(policy.delay);
                }
            }
        }
    }
    let _ = fs::remove_file(staged);
    let err = last_error.unwrap_or_else(|| io::Error::other("promotion never attempted"));
    Err(io_failure("replace", target, err))
}

/// Moves an update that was verified somewhere else (the data directory,
/// when the install directory is not writable) into the staging slot beside
/// `target`, so promotion stays a same-directory rename.
pub fn stage_beside_target(
    platform: &dyn Platform,
    target: &Path,
    source: &Path,
) -> Result<PathBuf, UpdateError> {
    let staged = staged_path(target);
    if source == staged {
        return Ok(staged);
    }
    let size = fs::metadata(source)
        .map_err(|err| UpdateError::verification(format!("read {}: {err}", source.display())))?
        .len();
    if size == 0 {
        return Err(UpdateError::verification("downloaded artifact is empty"));
    }
    fs::copy(source, &staged).map_err(|err| io_failure("stage update at", &staged, err))?;
    if let Err(err) = platform.set_executable_attributes(target, &staged) {
        let _ = fs::remove_file(&staged);
        return Err(io_failure("set executable attributes on", &staged, err));
    }
    platform.clear_download_attributes(&staged);
    if let Err(err) = fs::remove_file(source) {
        warn!(error = %err, path = %source.display(), "could not remove downloaded update");
    }
    Ok(staged)
}

/// Deletes artifacts an interrupted update left beside `target`. Returns
/// what was removed.
pub fn cleanup_leftovers(target: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for leftover in [staged_path(target), parked_path(target)] {
        match fs::remove_file(&leftover) {
            Ok(()) => {
                info!(path = %leftover.display(), "removed leftover update artifact");
                removed.push(leftover);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(error = %err, path = %leftover.display(), "could not remove leftover update artifact"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Os;
    use crate::platform_linux::LinuxPlatform;
    use crate::platform_windows::WindowsPlatform;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Linux behaviour whose promotion fails a fixed number of times.
    struct FlakyPromote {
        inner: LinuxPlatform,
        failures: AtomicU32,
        kind: io::ErrorKind,
    }

    impl FlakyPromote {
        fn new(failures: u32, kind: io::ErrorKind) -> Self {
            Self {
                inner: LinuxPlatform::with_user_data_dir(PathBuf::from("/unused")),
                failures: AtomicU32::new(failures),
                kind,
            }
        }
    }

    impl Platform for FlakyPromote {
        fn os(&self) -> Os {
            self.inner.os()
        }
        fn user_data_dir(&self) -> Option<PathBuf> {
            self.inner.user_data_dir()
        }
        fn is_installed(&self, exe_dir: &Path) -> bool {
            self.inner.is_installed(exe_dir)
        }
        fn set_executable_attributes(&self, original: &Path, staged: &Path) -> io::Result<()> {
            self.inner.set_executable_attributes(original, staged)
        }
        fn promote(&self, staged: &Path, target: &Path) -> io::Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(io::Error::from(self.kind));
            }
            fs::rename(staged, target)
        }
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn install_target(dir: &Path) -> PathBuf {
        let target = dir.join("winterpack");
        fs::write(&target, b"old binary").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();
        }
        target
    }

    #[test]
    fn applies_in_place_when_the_os_allows_it() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"new binary").unwrap();

        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));
        let mut applier = UpdateApplier::new(&platform, &target);
        applier.begin_download().unwrap();
        applier
            .stage(&download, Some(&format!("sha256:{}", sha256_hex(b"new binary"))))
            .unwrap();
        assert_eq!(applier.phase(), ApplyPhase::Staged);

        let outcome = applier.apply().unwrap();
        assert_eq!(outcome, ApplyOutcome::AppliedInPlace { target: target.clone() });
        assert_eq!(applier.phase(), ApplyPhase::Applied);
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
        assert!(!staged_path(&target).exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn hash_mismatch_is_never_staged() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"tampered").unwrap();

        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));
        let mut applier = UpdateApplier::new(&platform, &target);
        let err = applier
            .stage(&download, Some(&sha256_hex(b"new binary")))
            .unwrap_err();
        assert!(matches!(err, UpdateError::VerificationFailed { .. }));
        assert_eq!(applier.phase(), ApplyPhase::Idle);
        assert!(!staged_path(&target).exists());
        assert_eq!(fs::read(&target).unwrap(), b"old binary");
    }

    #[test]
    fn empty_download_fails_verification() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"").unwrap();
        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));
        let mut applier = UpdateApplier::new(&platform, &target);
        assert!(matches!(
            applier.stage(&download, None),
            Err(UpdateError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn failed_promotion_leaves_original_intact() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"new binary").unwrap();

        let platform = FlakyPromote::new(1, io::ErrorKind::Interrupted);
        let mut applier = UpdateApplier::new(&platform, &target);
        applier.stage(&download, None).unwrap();
        let err = applier.apply().unwrap_err();

        assert!(matches!(err, UpdateError::ApplyFailed { .. }));
        assert_eq!(applier.phase(), ApplyPhase::RolledBack);
        assert_eq!(fs::read(&target).unwrap(), b"old binary");
        assert!(!staged_path(&target).exists());
    }

    #[test]
    fn permission_failure_asks_for_elevation() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"new binary").unwrap();

        let platform = FlakyPromote::new(1, io::ErrorKind::PermissionDenied);
        let mut applier = UpdateApplier::new(&platform, &target);
        applier.stage(&download, None).unwrap();
        match applier.apply().unwrap_err() {
            UpdateError::ElevationRequired { path } => assert_eq!(path, tmp.path()),
            other => panic!("expected elevation, got {other:?}"),
        }
        assert_eq!(fs::read(&target).unwrap(), b"old binary");
    }

    #[test]
    fn locked_executables_are_handed_off() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("download.bin");
        fs::write(&download, b"new binary").unwrap();

        let platform = WindowsPlatform::with_dirs(tmp.path().join("data"), None);
        let mut applier = UpdateApplier::new(&platform, &target);
        applier.stage(&download, None).unwrap();
        let outcome = applier.apply().unwrap();
        let staged = staged_path(&target);
        assert_eq!(
            outcome,
            ApplyOutcome::StagedForExternalRestart {
                staged: staged.clone(),
                target: target.clone(),
            }
        );
        assert_eq!(fs::read(&target).unwrap(), b"old binary");
        assert_eq!(fs::read(&staged).unwrap(), b"new binary");

        finish_staged_update(&platform, &target, &staged, FinishPolicy::default()).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
        assert!(!staged.exists());
    }

    #[test]
    fn finish_retries_until_the_target_is_released() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let staged = staged_path(&target);
        fs::write(&staged, b"new binary").unwrap();
        let platform = FlakyPromote::new(2, io::ErrorKind::Other);
        let policy = FinishPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        finish_staged_update(&platform, &target, &staged, policy).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
    }

    #[test]
    fn finish_gives_up_and_removes_staged_file() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let staged = staged_path(&target);
        fs::write(&staged, b"new binary").unwrap();
        let platform = FlakyPromote::new(5, io::ErrorKind::Other);
        let policy = FinishPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        };
        assert!(finish_staged_update(&platform, &target, &staged, policy).is_err());
        assert_eq!(fs::read(&target).unwrap(), b"old binary");
        assert!(!staged.exists());
    }

    #[test]
    fn apply_requires_a_staged_artifact() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));
        let mut applier = UpdateApplier::new(&platform, &target);
        assert!(applier.apply().is_err());
        assert_eq!(applier.phase(), ApplyPhase::Idle);
    }

    #[test]
    fn update_downloaded_elsewhere_is_staged_beside_the_target() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("install");
        fs::create_dir_all(&install).unwrap();
        let target = install_target(&install);
        let download = tmp.path().join("data").join("winterpack.download");
        fs::create_dir_all(download.parent().unwrap()).unwrap();
        fs::write(&download, b"new binary").unwrap();
        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));

        let staged = stage_beside_target(&platform, &target, &download).unwrap();
        assert_eq!(staged, staged_path(&target));
        assert!(!download.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&staged).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        finish_staged_update(&platform, &target, &staged, FinishPolicy::default()).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
        assert!(!staged.exists());
    }

    #[test]
    fn empty_download_is_not_staged() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        let download = tmp.path().join("winterpack.download");
        fs::write(&download, b"").unwrap();
        let platform = LinuxPlatform::with_user_data_dir(tmp.path().join("data"));
        assert!(matches!(
            stage_beside_target(&platform, &target, &download),
            Err(UpdateError::VerificationFailed { .. })
        ));
        assert!(!staged_path(&target).exists());
    }

    #[test]
    fn leftovers_are_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        let target = install_target(tmp.path());
        fs::write(staged_path(&target), b"partial").unwrap();
        fs::write(parked_path(&target), b"previous").unwrap();
        let removed = cleanup_leftovers(&target);
        assert_eq!(removed.len(), 2);
        assert!(target.exists());
        assert!(cleanup_leftovers(&target).is_empty());
    }
}
