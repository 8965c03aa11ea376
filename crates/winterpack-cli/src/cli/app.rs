use super::*;

/// Everything a command needs once startup ordering has run.
pub(super) struct Session {
    pub(super) platform: Box<dyn Platform>,
    pub(super) boot: Bootstrap,
}

pub async fn run() -> anyhow::Result<()> {
    let logging = logging::init();
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Launch(LaunchArgs::default()));
    info!(
        command = command_label(&command),
        version = env!("CARGO_PKG_VERSION"),
        "running command"
    );

    // The hand-off helper runs from the staged binary and must not touch
    // the data directory.
    if let Commands::FinishUpdate(args) = &command {
        return handle_finish_update(args);
    }

    let session = start_session(&logging)?;
    match command {
        Commands::Launch(args) => handle_launch(&session, &args).await,
        Commands::Status(args) => handle_status(&session, &args),
        Commands::Migrate => handle_migrate(&session),
        Commands::Update(args) => handle_update(&session, &args).await,
        Commands::Settings(args) => handle_settings(&session, &args),
        Commands::FinishUpdate(args) => handle_finish_update(&args),
    }
}

fn start_session(logging: &Logging) -> anyhow::Result<Session> {
    let platform = current_platform();
    let ctx = ProbeContext::from_env()?;
    let boot = bootstrap(platform.as_ref(), &ctx, &BootstrapOptions::default())?;
    match logging.file().attach(&boot.record.data_path) {
        Ok(path) => info!(path = %path.display(), "logging to file"),
        Err(err) => warn!(error = %format!("{err:#}"), "file logging disabled"),
    }
    if boot.settings.debug_enabled {
        logging.enable_debug();
    }
    info!(
        mode = boot.record.mode.as_str(),
        data = %boot.record.data_path.display(),
        migration = boot.migration.state.status.as_str(),
        "startup complete"
    );
    Ok(Session { platform, boot })
}
