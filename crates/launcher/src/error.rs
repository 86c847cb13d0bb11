use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("launcher version '{version}' is not a valid version: {source}")]
    CurrentVersion {
        version: &'static str,
        #[source]
        source: launcher_update::VersionParseError,
    },
    #[error("no installable release found for tag '{0}'")]
    TagNotFound(String),
    #[error("update failed: {0}")]
    Install(String),
    #[error("no backup could be restored over {}", .0.display())]
    Rollback(PathBuf),
}
