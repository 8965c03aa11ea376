//! Update orchestration on top of the release client and the applier:
//! scheduled checks, download-and-apply, the locked-executable hand-off and
//! restarting into the new binary.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};
use winterpack_core::UpdateError;
use winterpack_core::apply::{ApplyOutcome, UpdateApplier};
use winterpack_core::check_state::{UpdateCheckState, current_epoch_seconds, update_check_due};
use winterpack_core::error::EXIT_GENERIC;
use winterpack_core::lockfile::UpdateLock;
use winterpack_core::platform::{Os, Platform};
use winterpack_core::probe::InstallationRecord;
use winterpack_core::version::{Channel, Version, is_newer};
use winterpack_release::{Downloader, ReleaseClient, ReleaseInfo};

mod apply;
mod auto;
mod check;
mod errors;
mod restart;

pub use apply::{ELEVATED_DOWNLOAD_NAME, download_and_apply, download_for_elevated_finish};
pub use auto::{AutoUpdate, check_and_maybe_apply};
pub use check::{CHECK_TIMEOUT, UpdateCheck, check_for_update};
pub use errors::{exit_code, update_error, user_hint};
pub use restart::{
    confirm_elevation, elevated_command, elevated_finish_args, finish_command_args, relaunch,
    restart_current_process, run_elevated_finish, spawn_finish_helper,
};
