// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::ByteBuffer;

use super::{
    open_container_file, read_index_file, ContainerDataStore, ContainerEntry,
    ContainerIndexReader, ContainerIndexSet, ContainerKind, ContainerPair, EntryLocation, HedFile,
};

/// A HED/PKG pair from the digital release.
pub struct DigitalContainer<R> {
    path: PathBuf,
    index: ByteBuffer,
    data: R,
    data_length: u64,
}

impl DigitalContainer<BufReader<File>> {
    /// Opens the HED at `index` and the PKG at `data`.
    pub fn from_files(index: &Path, data: &Path) -> Result<Self, Error> {
        debug!(index = %index.display(), data = %data.display(), "Opening digital containers");

        let index_buffer = read_index_file(index)?;
        let reader = open_container_file(data)?;
        let data_length = reader
            .get_ref()
            .metadata()
            .map_err(|err| Error::missing(data, err.to_string()))?
            .len();

        Ok(Self {
            path: data.to_path_buf(),
            index: index_buffer,
            data: reader,
            data_length,
        })
    }
}

impl<R: Read + Seek> DigitalContainer<R> {
    /// Wraps an already read `index` and a `data` reader holding the whole PKG.
    pub fn from_reader(path: impl Into<PathBuf>, index: ByteBuffer, data: R, data_length: u64) -> Self {
        Self {
            path: path.into(),
            index,
            data,
            data_length,
        }
    }
}

impl<R: Read + Seek> ContainerIndexReader for DigitalContainer<R> {
    fn read_index(&mut self) -> Result<ContainerIndexSet, Error> {
        let hed = HedFile::from_existing(&self.index)
            .map_err(|err| Error::format(&self.path, format!("unable to read index: {err}")))?;

        debug!(entries = hed.entries.len(), "Read digital index");

        Ok(hed.entries.iter().map(ContainerEntry::from).collect())
    }
}

impl<R: Read + Seek> ContainerDataStore for DigitalContainer<R> {
    fn open_entry(&mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + '_>, Error> {
        let EntryLocation::Offset(offset) = entry.location else {
            return Err(Error::format(
                &self.path,
                format!("entry {} is not addressed in bytes", entry.hash),
            ));
        };

        let offset = match u64::try_from(offset) {
            Ok(offset) if offset < self.data_length => offset,
            _ => {
                return Err(Error::format(
                    &self.path,
                    format!(
                        "entry {} starts at {offset:#X}, outside of the data container ({} bytes)",
                        entry.hash, self.data_length
                    ),
                ))
            }
        };

        self.data
            .seek(SeekFrom::Start(offset))
            .map_err(|err| Error::format(&self.path, err.to_string()))?;

        Ok(Box::new((&mut self.data).take(self.data_length - offset)))
    }
}

impl<R: Read + Seek + Send> ContainerPair for DigitalContainer<R> {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Digital
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::container::EntryHash;

    fn test_container() -> DigitalContainer<Cursor<Vec<u8>>> {
        let mut index = Vec::new();
        for (md5, offset) in [([0x11u8; 16], 0i64), ([0x22; 16], 4), ([0x33; 16], -8)] {
            index.extend_from_slice(&md5);
            index.extend_from_slice(&offset.to_le_bytes());
            index.extend_from_slice(&4i32.to_le_bytes());
            index.extend_from_slice(&4i32.to_le_bytes());
        }

        let data = b"ABCDEFGH".to_vec();
        DigitalContainer::from_reader("memory", index, Cursor::new(data), 8)
    }

    #[test]
    fn read_entries() {
        let mut container = test_container();
        let entries = container.read_index().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].hash, EntryHash::Digital([0x22; 16]));

        let mut data = Vec::new();
        container.open_entry(&entries[1]).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"EFGH");

        let mut data = Vec::new();
        container.open_entry(&entries[0]).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"ABCDEFGH");
    }

    #[test]
    fn invalid_offsets() {
        let mut container = test_container();
        let entries = container.read_index().unwrap();

        // negative offsets only fail once they're opened
        assert!(matches!(
            container.open_entry(&entries[2]),
            Err(Error::Format { .. })
        ));

        let past_end = ContainerEntry {
            location: EntryLocation::Offset(8),
            ..entries[0].clone()
        };
        assert!(container.open_entry(&past_end).is_err());
    }

    #[test]
    fn truncated_index() {
        let mut container =
            DigitalContainer::from_reader("memory", vec![0u8; 0x21], Cursor::new(Vec::new()), 0);
        assert!(matches!(
            container.read_index(),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn from_files() {
        let dir = tempfile::tempdir().unwrap();
        let hed = dir.path().join("kh2_first.hed");
        let pkg = dir.path().join("kh2_first.pkg");

        let mut index = Vec::new();
        index.extend_from_slice(&[0x44; 16]);
        index.extend_from_slice(&2i64.to_le_bytes());
        index.extend_from_slice(&2i32.to_le_bytes());
        index.extend_from_slice(&2i32.to_le_bytes());
        std::fs::write(&hed, index).unwrap();
        std::fs::write(&pkg, b"xxOK").unwrap();

        let mut container = DigitalContainer::from_files(&hed, &pkg).unwrap();
        assert_eq!(container.kind(), ContainerKind::Digital);

        let entries = container.read_index().unwrap();
        let mut data = Vec::new();
        container.open_entry(&entries[0]).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"OK");
    }
}
