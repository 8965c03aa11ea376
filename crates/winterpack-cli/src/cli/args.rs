use super::*;

#[derive(Parser)]
#[command(name = "winterpack", author, version, about = "Winterpack modpack launcher")]
pub(super) struct Cli {
    #[command(subcommand)]
    pub(super) command: Option<Commands>,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Start the launcher (default)")]
    Launch(LaunchArgs),
    #[command(about = "Show installation, migration and update status")]
    Status(StatusArgs),
    #[command(about = "Move portable data into the data directory")]
    Migrate,
    #[command(about = "Check for updates and install the latest release")]
    Update(UpdateArgs),
    #[command(about = "Show or change launcher settings")]
    Settings(SettingsArgs),
    #[command(hide = true)]
    FinishUpdate(FinishUpdateArgs),
}

#[derive(Parser, Default)]
pub(super) struct LaunchArgs {
    #[arg(long, help = "Do not check for updates on this start")]
    pub(super) skip_update_check: bool,
    #[arg(
        long,
        conflicts_with = "skip_update_check",
        help = "Check for updates even if the last check was recent"
    )]
    pub(super) force_update_check: bool,
}

#[derive(Parser)]
pub(super) struct StatusArgs {
    #[arg(long, help = "Print machine-readable JSON")]
    pub(super) json: bool,
}

#[derive(Parser)]
pub(super) struct UpdateArgs {
    #[arg(long, help = "Only report whether an update is available")]
    pub(super) check: bool,
    #[arg(long, short = 'y', help = "Install without asking for confirmation")]
    pub(super) yes: bool,
    #[arg(long, help = "Reinstall even if already up to date")]
    pub(super) force: bool,
}

#[derive(Parser)]
pub(super) struct SettingsArgs {
    #[command(subcommand)]
    pub(super) command: SettingsCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum SettingsCommands {
    #[command(about = "Print the current settings")]
    Show,
    #[command(about = "Change one or more settings")]
    Set(SetSettingsArgs),
    #[command(about = "Switch memory back to automatic sizing")]
    ResetAuto,
}

#[derive(Parser, Default)]
pub(super) struct SetSettingsArgs {
    #[arg(
        long,
        allow_negative_numbers = true,
        help = "Game memory in MB; clamped to the supported range"
    )]
    pub(super) memory_mb: Option<i64>,
    #[arg(long, help = "Size memory automatically from installed RAM")]
    pub(super) auto_ram: Option<bool>,
    #[arg(long, help = "Follow the dev release channel")]
    pub(super) dev_builds: Option<bool>,
    #[arg(long, help = "Enable debug logging")]
    pub(super) debug: Option<bool>,
}

#[derive(Parser)]
pub(super) struct FinishUpdateArgs {
    #[arg(long)]
    pub(super) target: PathBuf,
    #[arg(long)]
    pub(super) staged: PathBuf,
    /// Set when running elevated, so the launcher is not restarted as root.
    #[arg(long)]
    pub(super) no_relaunch: bool,
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Launch(_) => "launch",
        Commands::Status(_) => "status",
        Commands::Migrate => "migrate",
        Commands::Update(_) => "update",
        Commands::Settings(_) => "settings",
        Commands::FinishUpdate(_) => "finish-update",
    }
}
