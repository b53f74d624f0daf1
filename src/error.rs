// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use thiserror::Error;

use crate::container::EntryHash;

/// Everything that can go wrong while reading containers or extracting them.
#[derive(Debug, Error)]
pub enum Error {
    /// The index or data container of a title could not be found or opened.
    #[error("missing container {}: {reason}", path.display())]
    MissingContainer {
        /// The file (or disc image) that was searched.
        path: PathBuf,
        /// Why it is considered missing.
        reason: String,
    },
    /// An index table is malformed, or an entry points outside of its data container.
    #[error("invalid container format in {}: {reason}", path.display())]
    Format {
        /// The container that failed to parse.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// The original payload of an entry could not be decoded.
    #[error("corrupt asset {hash}: {reason}")]
    CorruptAsset {
        /// The content hash of the broken entry.
        hash: EntryHash,
        /// What was wrong with it.
        reason: String,
    },
    /// Writing to the destination failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// The file or directory being written.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A configuration file or name table is invalid.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What was wrong with it.
        reason: String,
    },
}

impl Error {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MissingContainer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Whether this error ends the extraction of the whole title, rather than a single entry.
    pub fn is_fatal_for_title(&self) -> bool {
        !matches!(self, Error::CorruptAsset { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_assets_only_affect_one_entry() {
        let corrupt = Error::CorruptAsset {
            hash: EntryHash::Disc {
                hash32: 0xDEADBEEF,
                hash16: 0x1234,
            },
            reason: "bad header".to_string(),
        };
        assert!(!corrupt.is_fatal_for_title());
        assert_eq!(
            corrupt.to_string(),
            "corrupt asset DEADBEEF_1234: bad header"
        );

        assert!(Error::format("kh2.idx", "truncated").is_fatal_for_title());
        assert!(Error::missing("kh2.iso", "not found").is_fatal_for_title());

        assert_eq!(
            Error::format("kh2.idx", "truncated").to_string(),
            "invalid container format in kh2.idx: truncated"
        );
    }
}
