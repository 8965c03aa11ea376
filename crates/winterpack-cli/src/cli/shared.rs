use super::*;

pub(super) fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

pub(super) fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} (y/n): ");
    io::stdout().flush().context("flush stdout")?;
    let mut input = String::new();
    io::stdin().read_line(&mut input).context("read answer")?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub(super) fn current_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION"))
}

/// RFC 3339 in UTC; the raw number if it is out of range.
pub(super) fn format_epoch(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .and_then(|timestamp| timestamp.format(&Rfc3339).ok())
        .unwrap_or_else(|| seconds.to_string())
}
