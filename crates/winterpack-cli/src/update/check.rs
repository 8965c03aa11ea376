use super::*;

/// Upper bound on one release-feed request.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct UpdateCheck {
    pub current: Version,
    pub channel: Channel,
    pub release: ReleaseInfo,
}

impl UpdateCheck {
    pub fn is_newer(&self) -> bool {
        is_newer(&self.current, &self.release.version)
    }
}

pub async fn check_for_update(
    client: &ReleaseClient,
    current: &Version,
    channel: Channel,
    timeout: Duration,
) -> Result<UpdateCheck, UpdateError> {
    let release = client.fetch_latest(channel, timeout).await?;
    let check = UpdateCheck {
        current: current.clone(),
        channel,
        release,
    };
    info!(
        current = %check.current,
        latest = %check.release.version,
        channel = channel.as_str(),
        newer = check.is_newer(),
        "update check complete"
    );
    Ok(check)
}
