use std::path::PathBuf;

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_UPDATE_SYSTEM: i32 = 3;
pub const EXIT_ELEVATION_REQUIRED: i32 = 4;

/// Failure kinds of the update and migration subsystem.
///
/// Anything that can be defaulted (`Parse`, `SettingsCorrupt`) is normally
/// recovered where it happens and only logged; the rest is handed back to the
/// caller so it can tell the user what to do next.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("could not parse {what}: {cause}")]
    Parse { what: String, cause: String },

    #[error("update check failed: {cause}")]
    UpdateCheckFailed { cause: String, retryable: bool },

    #[error("download failed after {attempts} attempt(s): {cause}")]
    DownloadFailed { attempts: u32, cause: String },

    #[error("verification failed: {cause}")]
    VerificationFailed { cause: String },

    #[error("elevated permissions required to write {}", path.display())]
    ElevationRequired { path: PathBuf },

    #[error("applying update failed: {cause}")]
    ApplyFailed { cause: String },

    #[error("migration failed: {cause}")]
    MigrationFailed { cause: String },

    #[error("settings file {} is corrupt: {cause}", path.display())]
    SettingsCorrupt { path: PathBuf, cause: String },
}

impl UpdateError {
    pub fn check_failed(cause: impl Into<String>) -> Self {
        Self::UpdateCheckFailed {
            cause: cause.into(),
            retryable: false,
        }
    }

    pub fn check_timed_out(cause: impl Into<String>) -> Self {
        Self::UpdateCheckFailed {
            cause: cause.into(),
            retryable: true,
        }
    }

    pub fn verification(cause: impl Into<String>) -> Self {
        Self::VerificationFailed {
            cause: cause.into(),
        }
    }

    pub fn apply(cause: impl Into<String>) -> Self {
        Self::ApplyFailed {
            cause: cause.into(),
        }
    }

    pub fn migration(cause: impl Into<String>) -> Self {
        Self::MigrationFailed {
            cause: cause.into(),
        }
    }

    /// Whether running the same operation again later may succeed without
    /// any user intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateError::UpdateCheckFailed { retryable, .. } => *retryable,
            UpdateError::DownloadFailed { .. } => true,
            UpdateError::MigrationFailed { .. } => true,
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateError::ElevationRequired { .. } => EXIT_ELEVATION_REQUIRED,
            UpdateError::Parse { .. } | UpdateError::SettingsCorrupt { .. } => EXIT_GENERIC,
            _ => EXIT_UPDATE_SYSTEM,
        }
    }
}

/// Returns true when an I/O error means the caller lacks write access, as
/// opposed to the disk being full, the path vanishing, and so on.
pub fn is_permission_denied(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        return true;
    }
    // EROFS on unix, ERROR_ACCESS_DENIED is already mapped by std on windows.
    cfg!(unix) && matches!(err.raw_os_error(), Some(30))
}
