use super::*;

/// Replaces this process with `exe`, keeping the command line.
#[cfg(unix)]
pub fn restart_current_process(exe: &Path) -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let args: Vec<String> = std::env::args().skip(1).collect();
    info!(exe = %exe.display(), "restarting into updated executable");
    let err = Command::new(exe).args(args).exec();
    Err(err).context("re-exec winterpack")
}

#[cfg(not(unix))]
pub fn restart_current_process(exe: &Path) -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    info!(exe = %exe.display(), "restarting into updated executable");
    Command::new(exe)
        .args(args)
        .spawn()
        .context("restart winterpack")?;
    std::process::exit(0);
}

pub fn finish_command_args(target: &Path, staged: &Path) -> Vec<OsString> {
    vec![
        OsString::from("finish-update"),
        OsString::from("--target"),
        target.as_os_str().to_owned(),
        OsString::from("--staged"),
        staged.as_os_str().to_owned(),
    ]
}

/// Starts the staged binary as the hand-off helper. The caller must exit
/// right after so the helper can replace `target`.
pub fn spawn_finish_helper(staged: &Path, target: &Path) -> anyhow::Result<()> {
    info!(staged = %staged.display(), "handing off to update helper");
    Command::new(staged)
        .args(finish_command_args(target, staged))
        .spawn()
        .with_context(|| format!("start update helper {}", staged.display()))?;
    Ok(())
}

/// Starts `exe` detached with no arguments.
pub fn relaunch(exe: &Path) -> anyhow::Result<()> {
    Command::new(exe)
        .spawn()
        .with_context(|| format!("relaunch {}", exe.display()))?;
    Ok(())
}

/// `finish-update` arguments for an elevated run: the swap only, no
/// restart of the launcher under the elevated account.
pub fn elevated_finish_args(target: &Path, staged: &Path) -> Vec<OsString> {
    let mut args = finish_command_args(target, staged);
    args.push(OsString::from("--no-relaunch"));
    args
}

/// Program and arguments that run `program args` elevated on `os`.
pub fn elevated_command(os: Os, program: &Path, args: &[OsString]) -> (OsString, Vec<OsString>) {
    if os == Os::Windows {
        let quote = |value: &str| format!("'{}'", value.replace('\'', "''"));
        let mut command = format!(
            "Start-Process -Verb RunAs -FilePath {}",
            quote(&program.to_string_lossy())
        );
        if !args.is_empty() {
            let list = args
                .iter()
                .map(|arg| quote(&arg.to_string_lossy()))
                .collect::<Vec<_>>()
                .join(",");
            command.push_str(&format!(" -ArgumentList {list}"));
        }
        let args = ["-NoProfile", "-Command", command.as_str()]
            .into_iter()
            .map(OsString::from)
            .collect();
        return (OsString::from("powershell"), args);
    }
    let mut sudo_args = vec![program.as_os_str().to_owned()];
    sudo_args.extend(args.iter().cloned());
    (OsString::from("sudo"), sudo_args)
}

/// Asks whether to retry `reason` elevated. Never asks without a terminal.
pub fn confirm_elevation(reason: &str) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        return Ok(false);
    }
    let prompt_label = if cfg!(target_os = "windows") {
        "Windows UAC prompt"
    } else {
        "sudo password prompt"
    };
    println!(
        "Permission denied while attempting to {reason}. Retry with elevated permissions? You will see the {prompt_label}. (y/n):"
    );
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Runs only the promotion of `staged` over `target` elevated. Where a
/// running executable can be replaced the current binary does the swap and
/// this waits for it; otherwise the downloaded binary is started as the
/// hand-off helper and the caller must exit.
pub fn run_elevated_finish(
    platform: &dyn Platform,
    target: &Path,
    staged: &Path,
) -> anyhow::Result<bool> {
    let program = if platform.replaces_running_executable() {
        std::env::current_exe().context("resolve current executable")?
    } else {
        staged.to_path_buf()
    };
    let (elevator, args) = elevated_command(
        platform.os(),
        &program,
        &elevated_finish_args(target, staged),
    );
    info!(target = %target.display(), "requesting elevation to install update");
    let mut command = Command::new(&elevator);
    command.args(&args);
    if !platform.replaces_running_executable() {
        command.spawn().context("launch elevated process")?;
        return Ok(true);
    }
    let status = command.status().context("launch elevated process")?;
    Ok(status.success())
}
