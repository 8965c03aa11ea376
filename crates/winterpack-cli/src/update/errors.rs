use super::*;

/// The first [`UpdateError`] in the chain, if any.
pub fn update_error(err: &anyhow::Error) -> Option<&UpdateError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<UpdateError>())
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    update_error(err)
        .map(UpdateError::exit_code)
        .unwrap_or(EXIT_GENERIC)
}

/// What the user can do about `err`, when there is something.
pub fn user_hint(err: &UpdateError) -> Option<&'static str> {
    match err {
        UpdateError::ElevationRequired { .. } => Some(
            "Re-run with administrator rights, or move Winterpack to a folder you can write to.",
        ),
        UpdateError::UpdateCheckFailed {
            retryable: true, ..
        }
        | UpdateError::DownloadFailed { .. } => {
            Some("Check your internet connection and try again.")
        }
        UpdateError::VerificationFailed { .. } => {
            Some("The download did not match the published checksum. Try again later.")
        }
        UpdateError::MigrationFailed { .. } => Some(
            "Your existing data was not changed. The migration runs again on the next start.",
        ),
        _ => None,
    }
}
