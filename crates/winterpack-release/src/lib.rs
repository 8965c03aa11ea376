pub mod download;
mod github_models;
pub mod http;
pub mod release;

pub use download::{DownloadReport, Downloader};
pub use release::{AssetTarget, ReleaseClient, ReleaseInfo};
