use std::path::PathBuf;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{} should be directory but it is not!", .0.display())]
    NotADirectory(PathBuf),

    #[error("{0} is not a valid user:group definition")]
    InvalidOwner(String),

    #[error("Invalid server '{spec}': {reason}")]
    InvalidServer { spec: String, reason: String },

    #[error("Invalid source pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Writing of test files to {} failed: {source}", .path.display())]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: TransportError,
    },

    #[error("Destination {} is not an absolute path", .0.display())]
    RelativeDestination(PathBuf),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fails with [`Error::NotADirectory`] unless `path` is an existing directory.
pub fn require_dir(path: &std::path::Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::NotADirectory(path.to_path_buf()))
    }
}
