// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use binrw::{binread, BinRead};
use tracing::{debug, trace};

use crate::container::SECTOR_SIZE;
use crate::error::Error;

/// The volume descriptor set always starts at sector 16.
const FIRST_DESCRIPTOR_SECTOR: u64 = 16;

/// How many volume descriptors we look through before giving up.
const MAX_DESCRIPTORS: u64 = 16;

/// Offset of the root directory record inside of the primary volume descriptor.
const ROOT_RECORD_OFFSET: u64 = 156;

const DESCRIPTOR_PRIMARY: u8 = 1;
const DESCRIPTOR_TERMINATOR: u8 = 255;

const FLAG_DIRECTORY: u8 = 0x02;

#[binread]
#[derive(Debug)]
#[br(little)]
struct DirectoryRecord {
    #[br(pad_before = 2)]
    extent_sector: u32,
    #[br(pad_before = 4)]
    data_length: u32,
    #[br(pad_before = 4 + 7)]
    flags: u8,
    #[br(temp)]
    #[br(pad_before = 6)]
    identifier_length: u8,
    #[br(count = identifier_length)]
    #[br(map = |x: Vec<u8>| String::from_utf8_lossy(&x).to_string())]
    identifier: String,
}

/// A file located inside of the disc image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IsoFile {
    /// The first sector of the file.
    pub sector: u32,
    /// Size of the file in bytes.
    pub length: u32,
}

impl IsoFile {
    /// Byte offset of the file inside of the image.
    pub fn offset(&self) -> u64 {
        self.sector as u64 * SECTOR_SIZE
    }
}

/// The root directory of an ISO 9660 volume. Only the root is read, which is where the game keeps
/// its containers.
#[derive(Debug)]
pub struct IsoVolume {
    files: Vec<(String, IsoFile)>,
}

impl IsoVolume {
    /// Reads the root directory of the volume in `reader`. `path` is only used for error messages.
    pub fn read<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<IsoVolume, Error> {
        let root = find_root_record(reader, path)?;
        debug!(
            sector = root.extent_sector,
            length = root.data_length,
            "Found root directory"
        );

        let mut directory = vec![0u8; root.data_length as usize];
        reader
            .seek(SeekFrom::Start(root.extent_sector as u64 * SECTOR_SIZE))
            .and_then(|_| reader.read_exact(&mut directory))
            .map_err(|err| Error::format(path, format!("unable to read root directory: {err}")))?;

        let mut files = Vec::new();

        let mut position = 0usize;
        while position < directory.len() {
            let record_length = directory[position] as usize;

            // records never cross a sector boundary, the rest of the sector is zeroed
            if record_length == 0 {
                position = (position / SECTOR_SIZE as usize + 1) * SECTOR_SIZE as usize;
                continue;
            }

            if position + record_length > directory.len() {
                break;
            }

            let mut cursor = Cursor::new(&directory[position..position + record_length]);
            if let Ok(record) = DirectoryRecord::read(&mut cursor) {
                if record.flags & FLAG_DIRECTORY == 0 {
                    trace!(name = %record.identifier, sector = record.extent_sector, "Found file");

                    files.push((
                        record.identifier,
                        IsoFile {
                            sector: record.extent_sector,
                            length: record.data_length,
                        },
                    ));
                }
            }

            position += record_length;
        }

        Ok(IsoVolume { files })
    }

    /// Finds a file in the root directory. The comparison ignores case and the `;1` version suffix.
    pub fn find(&self, name: &str) -> Option<IsoFile> {
        let wanted = normalize_identifier(name);

        self.files
            .iter()
            .find(|(identifier, _)| normalize_identifier(identifier) == wanted)
            .map(|(_, file)| *file)
    }

    /// Lists every file in the root directory.
    pub fn files(&self) -> impl Iterator<Item = (&str, IsoFile)> {
        self.files.iter().map(|(name, file)| (name.as_str(), *file))
    }
}

fn find_root_record<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<DirectoryRecord, Error> {
    for sector in FIRST_DESCRIPTOR_SECTOR..FIRST_DESCRIPTOR_SECTOR + MAX_DESCRIPTORS {
        let mut descriptor = [0u8; SECTOR_SIZE as usize];
        reader
            .seek(SeekFrom::Start(sector * SECTOR_SIZE))
            .and_then(|_| reader.read_exact(&mut descriptor))
            .map_err(|_| Error::format(path, "not an ISO 9660 image"))?;

        if &descriptor[1..6] != b"CD001" {
            return Err(Error::format(path, "not an ISO 9660 image"));
        }

        match descriptor[0] {
            DESCRIPTOR_PRIMARY => {
                let mut cursor = Cursor::new(&descriptor[ROOT_RECORD_OFFSET as usize..]);
                return DirectoryRecord::read(&mut cursor).map_err(|err| {
                    Error::format(path, format!("invalid root directory record: {err}"))
                });
            }
            DESCRIPTOR_TERMINATOR => break,
            _ => continue,
        }
    }

    Err(Error::format(path, "no primary volume descriptor"))
}

/// Upper-cases the identifier, and strips the version and trailing dot.
fn normalize_identifier(identifier: &str) -> String {
    let identifier = identifier.split(';').next().unwrap_or(identifier);

    identifier.trim_end_matches('.').to_ascii_uppercase()
}

/// Builds a tiny ISO 9660 image with the given files in the root directory.
#[cfg(test)]
pub(crate) fn build_test_image(files: &[(&str, &[u8])]) -> Vec<u8> {
    fn record(identifier: &[u8], sector: u32, length: u32, flags: u8) -> Vec<u8> {
        let mut record_length = 33 + identifier.len();
        record_length += record_length % 2;

        let mut record = vec![0u8; record_length];
        record[0] = record_length as u8;
        record[2..6].copy_from_slice(&sector.to_le_bytes());
        record[6..10].copy_from_slice(&sector.to_be_bytes());
        record[10..14].copy_from_slice(&length.to_le_bytes());
        record[14..18].copy_from_slice(&length.to_be_bytes());
        record[25] = flags;
        record[32] = identifier.len() as u8;
        record[33..33 + identifier.len()].copy_from_slice(identifier);
        record
    }

    const ROOT_SECTOR: u32 = 18;
    let sector = SECTOR_SIZE as usize;

    let mut image = vec![0u8; sector * (ROOT_SECTOR as usize + 1)];

    let pvd = &mut image[16 * sector..17 * sector];
    pvd[0] = DESCRIPTOR_PRIMARY;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    let root = record(&[0], ROOT_SECTOR, SECTOR_SIZE as u32, FLAG_DIRECTORY);
    pvd[156..156 + root.len()].copy_from_slice(&root);

    let terminator = &mut image[17 * sector..18 * sector];
    terminator[0] = DESCRIPTOR_TERMINATOR;
    terminator[1..6].copy_from_slice(b"CD001");

    let mut directory = Vec::new();
    directory.extend(record(&[0], ROOT_SECTOR, SECTOR_SIZE as u32, FLAG_DIRECTORY));
    directory.extend(record(&[1], ROOT_SECTOR, SECTOR_SIZE as u32, FLAG_DIRECTORY));

    let mut next_sector = ROOT_SECTOR + 1;
    let mut contents = Vec::new();
    for (name, data) in files {
        directory.extend(record(name.as_bytes(), next_sector, data.len() as u32, 0));

        let mut padded = data.to_vec();
        padded.resize(data.len().div_ceil(sector).max(1) * sector, 0);
        next_sector += (padded.len() / sector) as u32;
        contents.extend(padded);
    }

    let root_start = ROOT_SECTOR as usize * sector;
    image[root_start..root_start + directory.len()].copy_from_slice(&directory);
    image.extend(contents);

    image
}
