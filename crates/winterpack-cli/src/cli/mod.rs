use crate::logging::{self, Logging};
use crate::startup::{Bootstrap, BootstrapOptions, bootstrap};
use crate::update;
use anyhow::Context;
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use winterpack_core::UpdateError;
use winterpack_core::apply::{ApplyOutcome, FinishPolicy, finish_staged_update, stage_beside_target};
use winterpack_core::check_state::{
    DEFAULT_CHECK_INTERVAL_SECS, UpdateCheckState, current_epoch_seconds,
};
use winterpack_core::lockfile::UpdateLock;
use winterpack_core::platform::{Platform, current_platform};
use winterpack_core::probe::{DATA_DIR_ENV, ProbeContext};
use winterpack_core::settings::Settings;
use winterpack_core::version::Version;
use winterpack_release::{Downloader, ReleaseClient};

mod app;
mod args;
mod launch_cmd;
mod misc_cmd;
mod settings_cmd;
mod shared;
#[cfg(test)]
mod tests;
mod update_cmd;

use args::*;

use launch_cmd::handle_launch;
use misc_cmd::{handle_finish_update, handle_migrate, handle_status};
use settings_cmd::handle_settings;
use shared::{confirm, current_version, format_epoch, is_interactive};
use update_cmd::handle_update;

pub async fn run() -> anyhow::Result<()> {
    app::run().await
}
