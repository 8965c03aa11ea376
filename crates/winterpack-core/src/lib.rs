pub mod apply;
pub mod check_state;
pub mod error;
pub mod fs_util;
pub mod lockfile;
pub mod memory;
pub mod migration;
pub mod platform;
pub mod platform_linux;
pub mod platform_macos;
pub mod platform_windows;
pub mod probe;
pub mod settings;
pub mod version;

pub use error::UpdateError;
