// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::crc::disc_hash;
use crate::error::Error;

mod idx;
pub use idx::{IdxBlockInfo, IdxEntry, IdxFile};

mod hed;
pub use hed::{HedEntry, HedFile};

mod disc;
pub use disc::DiscContainer;

mod digital;
pub use digital::DigitalContainer;

/// Size of a single sector on the disc, which is also the unit disc index locations are stored in.
pub const SECTOR_SIZE: u64 = 0x800;

/// How big the read buffer for data containers is.
pub(crate) const READ_BUFFER_SIZE: usize = 0x10000;

/// The two container families shipped by the different releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// IDX/IMG pairs from the original disc release, addressed in sectors.
    Disc,
    /// HED/PKG pairs from the digital release, addressed in bytes.
    Digital,
}

/// The content hash identifying an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryHash {
    /// The disc release stores two CRCs of the file path.
    Disc {
        /// CRC-32 of the path.
        hash32: u32,
        /// CRC-16 of the path.
        hash16: u16,
    },
    /// The digital release stores the MD5 digest of the file path.
    Digital([u8; 16]),
}

impl EntryHash {
    /// Calculates the hash `path` would have in a container of `kind`.
    pub fn from_path(kind: ContainerKind, path: &str) -> Self {
        match kind {
            ContainerKind::Disc => {
                let (hash32, hash16) = disc_hash(path);
                EntryHash::Disc { hash32, hash16 }
            }
            ContainerKind::Digital => EntryHash::Digital(Md5::digest(path.as_bytes()).into()),
        }
    }

    /// Parses the textual form produced by `Display`, e.g. `DEADBEEF_1234` or a 32 digit MD5.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some((hash32, hash16)) = text.split_once('_') {
            if hash32.len() != 8 || hash16.len() != 4 {
                return None;
            }

            return Some(EntryHash::Disc {
                hash32: u32::from_str_radix(hash32, 16).ok()?,
                hash16: u16::from_str_radix(hash16, 16).ok()?,
            });
        }

        let mut digest = [0u8; 16];
        hex::decode_to_slice(text, &mut digest).ok()?;
        Some(EntryHash::Digital(digest))
    }

    /// Which container family this hash belongs to.
    pub fn kind(&self) -> ContainerKind {
        match self {
            EntryHash::Disc { .. } => ContainerKind::Disc,
            EntryHash::Digital(_) => ContainerKind::Digital,
        }
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryHash::Disc { hash32, hash16 } => write!(f, "{hash32:08X}_{hash16:04X}"),
            EntryHash::Digital(digest) => write!(f, "{}", hex::encode(digest)),
        }
    }
}

/// Where the data of an entry starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryLocation {
    /// A sector, relative to the start of the data container.
    Sector(u32),
    /// An absolute byte offset into the data container.
    ///
    /// This is signed because that's how it's stored, negative offsets are rejected when the entry is opened.
    Offset(i64),
}

/// A single entry of an index table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerEntry {
    /// The content hash of the entry.
    pub hash: EntryHash,
    /// Where the entry's data starts in the paired data container.
    pub location: EntryLocation,
    /// How many bytes the index claims are stored, if it says. This is only informational,
    /// reads are never bounded by it.
    pub stored_length: Option<u64>,
}

/// All entries of one index, in the order they were stored.
pub type ContainerIndexSet = Vec<ContainerEntry>;

/// Something that can read an index table.
pub trait ContainerIndexReader {
    /// Reads the whole index table.
    fn read_index(&mut self) -> Result<ContainerIndexSet, Error>;
}

/// Something that hands out the data belonging to entries.
pub trait ContainerDataStore {
    /// Opens a stream starting at `entry`'s data, which runs until the end of the data container.
    ///
    /// The location is validated here, and not while reading the index.
    fn open_entry(&mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + '_>, Error>;
}

/// An index and its data container, opened together.
pub trait ContainerPair: ContainerIndexReader + ContainerDataStore + Send {
    /// Which container family this is.
    fn kind(&self) -> ContainerKind;
}

/// Where to find an index/data pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerSource {
    /// Both files live inside of a disc image, and are looked up by name.
    DiscImage {
        /// Path to the ISO.
        image: PathBuf,
        /// Name of the index inside the image, e.g. `KH2.IDX;1`.
        index_name: String,
        /// Name of the data container inside the image, e.g. `KH2.IMG;1`.
        data_name: String,
    },
    /// A disc index and data container that were already copied out of the image.
    DiscFiles {
        /// Path to the IDX file.
        index: PathBuf,
        /// Path to the IMG file.
        data: PathBuf,
    },
    /// A digital release pair.
    Digital {
        /// Path to the HED file.
        index: PathBuf,
        /// Path to the PKG file.
        data: PathBuf,
    },
}

impl ContainerSource {
    /// Which container family this source points to.
    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerSource::DiscImage { .. } | ContainerSource::DiscFiles { .. } => {
                ContainerKind::Disc
            }
            ContainerSource::Digital { .. } => ContainerKind::Digital,
        }
    }

    /// Opens both containers, failing with [`Error::MissingContainer`] if either can't be found.
    pub fn open(&self) -> Result<Box<dyn ContainerPair>, Error> {
        Ok(match self {
            ContainerSource::DiscImage {
                image,
                index_name,
                data_name,
            } => Box::new(DiscContainer::from_image(image, index_name, data_name)?),
            ContainerSource::DiscFiles { index, data } => {
                Box::new(DiscContainer::from_files(index, data)?)
            }
            ContainerSource::Digital { index, data } => {
                Box::new(DigitalContainer::from_files(index, data)?)
            }
        })
    }
}

impl fmt::Display for ContainerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerSource::DiscImage {
                image,
                index_name,
                data_name,
            } => write!(f, "{} ({index_name} + {data_name})", image.display()),
            ContainerSource::DiscFiles { index, data } | ContainerSource::Digital { index, data } => {
                write!(f, "{} + {}", index.display(), data.display())
            }
        }
    }
}

/// Opens a container file for buffered reading.
pub(crate) fn open_container_file(path: &Path) -> Result<BufReader<File>, Error> {
    let file = File::open(path).map_err(|err| Error::missing(path, err.to_string()))?;

    Ok(BufReader::with_capacity(READ_BUFFER_SIZE, file))
}

/// Reads a whole index file into memory, they are small enough.
pub(crate) fn read_index_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|err| Error::missing(path, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_display() {
        let disc = EntryHash::Disc {
            hash32: 0xDEADBEEF,
            hash16: 0x1234,
        };
        assert_eq!(disc.to_string(), "DEADBEEF_1234");

        let digital = EntryHash::Digital([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ]);
        assert_eq!(digital.to_string(), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn hash_parsing() {
        assert_eq!(
            EntryHash::parse("DEADBEEF_1234"),
            Some(EntryHash::Disc {
                hash32: 0xDEADBEEF,
                hash16: 0x1234
            })
        );
        assert_eq!(
            EntryHash::parse("00112233445566778899aabbccddeeff").map(|h| h.kind()),
            Some(ContainerKind::Digital)
        );

        assert!(EntryHash::parse("DEADBEEF_12345").is_none());
        assert!(EntryHash::parse("nothex").is_none());
        assert!(EntryHash::parse("0011").is_none());
    }

    #[test]
    fn digital_hash_is_md5() {
        // md5("")
        assert_eq!(
            EntryHash::from_path(ContainerKind::Digital, "").to_string(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn source_kind() {
        let source = ContainerSource::DiscFiles {
            index: "KH2.IDX".into(),
            data: "KH2.IMG".into(),
        };
        assert_eq!(source.kind(), ContainerKind::Disc);
        assert_eq!(source.to_string(), "KH2.IDX + KH2.IMG");
    }

    #[test]
    fn missing_source() {
        let source = ContainerSource::Digital {
            index: "does/not/exist.hed".into(),
            data: "does/not/exist.pkg".into(),
        };
        assert!(matches!(
            source.open(),
            Err(Error::MissingContainer { .. })
        ));
    }
}
