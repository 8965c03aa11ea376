use anyhow::{Context, bail};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = "update.lock";

/// Cross-process guard held while an update or a migration touches the
/// data directory or the executable. Released on drop.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
    file: File,
}

impl UpdateLock {
    pub fn try_acquire(data_dir: &Path) -> anyhow::Result<Option<Self>> {
        fs::create_dir_all(data_dir).context("create data directory for lock")?;
        let path = data_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lock file {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, file })),
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock update file exclusively"),
        }
    }

    pub fn acquire(data_dir: &Path) -> anyhow::Result<Self> {
        match Self::try_acquire(data_dir)? {
            Some(lock) => Ok(lock),
            None => bail!("another Winterpack process is updating or migrating"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(33))
}
