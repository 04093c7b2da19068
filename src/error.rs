use std::{io, path::PathBuf, time::Duration};

use client::proto::{magnet::MagnetError, torrent::TorrentError};
use thiserror::Error;

use crate::metadata::{AssemblyError, Progress};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid magnet URI: {0}")]
    InvalidMagnetUri(#[from] MagnetError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Output directory {} does not exist or is not a directory", .0.display())]
    InvalidOutputDir(PathBuf),

    #[error("Magnet has no trackers or peers to get metadata from")]
    NoPeerSources,

    #[error("Metadata downloading timed out after {elapsed:?} ({progress})")]
    Timeout { elapsed: Duration, progress: Progress },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Torrent(#[from] TorrentError),

    #[error("Output file {} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Timeout { .. } => 1,
            Error::InvalidMagnetUri(_) | Error::InvalidArgument(_) | Error::InvalidOutputDir(_) => 2,
            Error::NoPeerSources
            | Error::Assembly(_)
            | Error::Torrent(_)
            | Error::OutputExists(_)
            | Error::Io(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let timeout = Error::Timeout {
            elapsed: Duration::from_secs(1),
            progress: Progress::default(),
        };
        assert_eq!(1, timeout.exit_code());
        assert_eq!(2, Error::from(MagnetError::MissingInfoHash).exit_code());
        assert_eq!(2, Error::InvalidOutputDir("x".into()).exit_code());
        assert_eq!(3, Error::NoPeerSources.exit_code());
        assert_eq!(
            3,
            Error::from(AssemblyError::VerificationExhausted { attempts: 5 }).exit_code()
        );
    }
}
