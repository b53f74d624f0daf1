// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Error;
use crate::iso::IsoVolume;
use crate::ByteBuffer;

use super::{
    open_container_file, read_index_file, ContainerDataStore, ContainerEntry,
    ContainerIndexReader, ContainerIndexSet, ContainerKind, ContainerPair, EntryLocation, IdxFile,
    SECTOR_SIZE,
};

/// An IDX/IMG pair from the disc release.
pub struct DiscContainer<R> {
    /// Where the data came from, for error messages.
    path: PathBuf,
    index: ByteBuffer,
    data: R,
    /// First sector of the IMG inside of `data`.
    data_base_sector: u64,
    /// Size of the IMG in bytes.
    data_length: u64,
}

impl DiscContainer<BufReader<File>> {
    /// Locates `index_name` and `data_name` inside of the disc image at `image`.
    pub fn from_image(image: &Path, index_name: &str, data_name: &str) -> Result<Self, Error> {
        debug!(image = %image.display(), index_name, data_name, "Opening disc image");

        let mut reader = open_container_file(image)?;
        let image_length = reader
            .get_ref()
            .metadata()
            .map_err(|err| Error::missing(image, err.to_string()))?
            .len();

        let volume = IsoVolume::read(&mut reader, image)?;

        let index_file = volume
            .find(index_name)
            .ok_or_else(|| Error::missing(image, format!("unable to find {index_name} in the image")))?;
        let data_file = volume
            .find(data_name)
            .ok_or_else(|| Error::missing(image, format!("unable to find {data_name} in the image")))?;

        let mut index = vec![0u8; index_file.length as usize];
        reader
            .seek(SeekFrom::Start(index_file.offset()))
            .and_then(|_| reader.read_exact(&mut index))
            .map_err(|err| Error::format(image, format!("unable to read {index_name}: {err}")))?;

        // the directory record can claim more than the image holds, if it was cut short
        let available = image_length.saturating_sub(data_file.offset());
        if (data_file.length as u64) > available {
            warn!(
                data_name,
                claimed = data_file.length,
                available,
                "Data container is truncated"
            );
        }

        Ok(Self {
            path: image.to_path_buf(),
            index,
            data: reader,
            data_base_sector: data_file.sector as u64,
            data_length: available.min(data_file.length as u64),
        })
    }

    /// Opens an IDX and IMG that were already copied off the disc.
    pub fn from_files(index: &Path, data: &Path) -> Result<Self, Error> {
        debug!(index = %index.display(), data = %data.display(), "Opening disc containers");

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
            data_base_sector: 0,
            data_length,
        })
    }
}

impl<R: Read + Seek> DiscContainer<R> {
    /// Wraps an already read `index`, and a `data` reader whose IMG starts at `data_base_sector`.
    pub fn from_reader(
        path: impl Into<PathBuf>,
        index: ByteBuffer,
        data: R,
        data_base_sector: u32,
        data_length: u64,
    ) -> Self {
        Self {
            path: path.into(),
            index,
            data,
            data_base_sector: data_base_sector as u64,
            data_length,
        }
    }
}

impl<R: Read + Seek> ContainerIndexReader for DiscContainer<R> {
    fn read_index(&mut self) -> Result<ContainerIndexSet, Error> {
        let idx = IdxFile::from_existing(&self.index)
            .map_err(|err| Error::format(&self.path, format!("unable to read index: {err}")))?;

        debug!(entries = idx.entries.len(), "Read disc index");

        Ok(idx.entries.iter().map(ContainerEntry::from).collect())
    }
}

impl<R: Read + Seek> ContainerDataStore for DiscContainer<R> {
    fn open_entry(&mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + '_>, Error> {
        let EntryLocation::Sector(block) = entry.location else {
            return Err(Error::format(
                &self.path,
                format!("entry {} is not addressed in sectors", entry.hash),
            ));
        };

        let offset = block as u64 * SECTOR_SIZE;
        if offset >= self.data_length {
            return Err(Error::format(
                &self.path,
                format!(
                    "entry {} starts at sector {block}, past the end of the data container ({} bytes)",
                    entry.hash, self.data_length
                ),
            ));
        }

        self.data
            .seek(SeekFrom::Start(
                (self.data_base_sector + block as u64) * SECTOR_SIZE,
            ))
            .map_err(|err| Error::format(&self.path, err.to_string()))?;

        Ok(Box::new((&mut self.data).take(self.data_length - offset)))
    }
}

impl<R: Read + Seek + Send> ContainerPair for DiscContainer<R> {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Disc
    }
}
