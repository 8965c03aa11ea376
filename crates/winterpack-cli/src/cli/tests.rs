use super::*;
use clap::CommandFactory;
use std::ffi::OsString;
use std::path::Path;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("winterpack").chain(args.iter().copied())).unwrap()
}

#[test]
fn command_definitions_are_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn no_subcommand_means_launch() {
    assert!(parse(&[]).command.is_none());
    assert!(matches!(
        parse(&["launch", "--force-update-check"]).command,
        Some(Commands::Launch(LaunchArgs {
            force_update_check: true,
            skip_update_check: false
        }))
    ));
}

#[test]
fn launch_flags_conflict() {
    let result = Cli::try_parse_from([
        "winterpack",
        "launch",
        "--skip-update-check",
        "--force-update-check",
    ]);
    assert!(result.is_err());
}

#[test]
fn update_flags_parse() {
    let Some(Commands::Update(args)) = parse(&["update", "--check", "-y"]).command else {
        panic!("expected update command");
    };
    assert!(args.check);
    assert!(args.yes);
    assert!(!args.force);
}

#[test]
fn settings_set_accepts_negative_memory() {
    let Some(Commands::Settings(SettingsArgs {
        command: SettingsCommands::Set(args),
    })) = parse(&["settings", "set", "--memory-mb", "-512", "--debug", "true"]).command
    else {
        panic!("expected settings set");
    };
    assert_eq!(args.memory_mb, Some(-512));
    assert_eq!(args.debug, Some(true));
    assert_eq!(args.auto_ram, None);
}

#[test]
fn finish_update_round_trips_helper_arguments() {
    let target = Path::new("/opt/winterpack/winterpack");
    let staged = Path::new("/opt/winterpack/winterpack.new");
    let args: Vec<OsString> = std::iter::once(OsString::from("winterpack"))
        .chain(update::finish_command_args(target, staged))
        .collect();
    let cli = Cli::try_parse_from(args).unwrap();
    let Some(Commands::FinishUpdate(finish)) = cli.command else {
        panic!("expected finish-update");
    };
    assert_eq!(finish.target, target);
    assert_eq!(finish.staged, staged);
    assert!(!finish.no_relaunch);
}

#[test]
fn elevated_finish_skips_the_relaunch() {
    let target = Path::new("/opt/winterpack/winterpack");
    let staged = Path::new("/home/u/.local/share/winterpack/winterpack.download");
    let args: Vec<OsString> = std::iter::once(OsString::from("winterpack"))
        .chain(update::elevated_finish_args(target, staged))
        .collect();
    let cli = Cli::try_parse_from(args).unwrap();
    let Some(Commands::FinishUpdate(finish)) = cli.command else {
        panic!("expected finish-update");
    };
    assert!(finish.no_relaunch);
    assert_eq!(finish.staged, staged);
}

#[test]
fn finish_update_is_hidden_from_help() {
    let help = Cli::command().render_help().to_string();
    assert!(!help.contains("finish-update"));
    assert!(help.contains("update"));
}

#[test]
fn explicit_memory_disables_auto_sizing() {
    let mut settings = Settings::defaults(8192);
    let changes = SetSettingsArgs {
        memory_mb: Some(100_000),
        ..SetSettingsArgs::default()
    };
    assert!(settings_cmd::apply_changes(&mut settings, &changes, 8192));
    assert_eq!(settings.memory_mb, 16384);
    assert!(!settings.auto_ram);
}

#[test]
fn auto_ram_wins_over_explicit_memory() {
    let mut settings = Settings::defaults(8192);
    let changes = SetSettingsArgs {
        memory_mb: Some(3000),
        auto_ram: Some(true),
        ..SetSettingsArgs::default()
    };
    assert!(settings_cmd::apply_changes(&mut settings, &changes, 8192));
    assert!(settings.auto_ram);
    assert_eq!(settings, Settings::defaults(8192));
}

#[test]
fn empty_settings_change_is_reported() {
    let mut settings = Settings::defaults(8192);
    let before = settings.clone();
    assert!(!settings_cmd::apply_changes(
        &mut settings,
        &SetSettingsArgs::default(),
        8192
    ));
    assert_eq!(settings, before);
}

#[test]
fn channel_follows_dev_builds_setting() {
    let mut settings = Settings::defaults(8192);
    let changes = SetSettingsArgs {
        dev_builds: Some(true),
        ..SetSettingsArgs::default()
    };
    settings_cmd::apply_changes(&mut settings, &changes, 8192);
    assert_eq!(settings.update_channel().as_str(), "dev");
}

#[test]
fn epochs_format_as_rfc3339() {
    assert_eq!(format_epoch(1_700_000_000), "2023-11-14T22:13:20Z");
    assert_eq!(format_epoch(u64::MAX), u64::MAX.to_string());
}

#[test]
fn status_json_reports_paths_and_settings() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("bin");
    std::fs::create_dir_all(&root).unwrap();
    let exe = root.join("winterpack");
    std::fs::write(&exe, b"binary").unwrap();
    let data = tmp.path().join("data");
    let platform = winterpack_core::platform_linux::LinuxPlatform::with_user_data_dir(data.clone());
    let ctx = ProbeContext {
        exe_path: exe,
        data_dir_override: None,
    };
    let options = BootstrapOptions {
        backup_root: tmp.path().to_path_buf(),
        total_ram_mb: Some(8192),
    };
    let boot = bootstrap(&platform, &ctx, &options).unwrap();

    let value = misc_cmd::status_json(&boot, &UpdateCheckState::default());
    assert_eq!(value["mode"], "portable");
    assert_eq!(value["migration"]["status"], "not-needed");
    assert_eq!(value["settings"]["memoryMB"], 4096);
    assert_eq!(value["settings"]["autoRam"], true);
    assert!(value["updateCheck"]["lastCheck"].is_null());
}
