use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseItem {
    pub(crate) tag_name: String,
    #[serde(default)]
    pub(crate) draft: bool,
    #[serde(default)]
    pub(crate) prerelease: bool,
    #[serde(default)]
    pub(crate) assets: Vec<AssetItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetItem {
    pub(crate) name: String,
    pub(crate) browser_download_url: String,
    #[serde(default)]
    pub(crate) size: Option<u64>,
    /// `sha256:<hex>` on releases published after GitHub started
    /// computing asset digests.
    #[serde(default)]
    pub(crate) digest: Option<String>,
}

impl AssetItem {
    pub(crate) fn sha256(&self) -> Option<&str> {
        let digest = self.digest.as_deref()?.trim();
        let (algorithm, hex) = digest.split_once(':')?;
        (algorithm.eq_ignore_ascii_case("sha256") && !hex.is_empty()).then_some(hex)
    }
}
