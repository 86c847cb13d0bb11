mod commands;
mod paths;

pub use commands::{Detach, HideWindow};
pub use paths::{AppPaths, AppPathsError, default_download_dir};
