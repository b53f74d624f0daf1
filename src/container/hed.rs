// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Cursor;

use binrw::helpers::until_eof;
use binrw::{binread, BinRead, BinResult};

use crate::ByteSpan;

use super::{ContainerEntry, EntryHash, EntryLocation};

/// Size of a single HED record.
const HED_ENTRY_SIZE: usize = 0x20;

#[binread]
#[derive(Debug)]
#[br(little)]
pub struct HedEntry {
    /// MD5 of the file path.
    pub md5: [u8; 16],
    /// Absolute offset into the PKG.
    pub offset: i64,
    /// Size of the stored HD asset inside of the PKG.
    pub data_length: i32,
    /// Size of the original file.
    pub actual_length: i32,
}

impl From<&HedEntry> for ContainerEntry {
    fn from(entry: &HedEntry) -> Self {
        ContainerEntry {
            hash: EntryHash::Digital(entry.md5),
            location: EntryLocation::Offset(entry.offset),
            stored_length: u64::try_from(entry.data_length).ok(),
        }
    }
}

/// A digital release index. There is no header, records simply run until the end of the file.
#[binread]
#[derive(Debug)]
#[br(little)]
pub struct HedFile {
    #[br(parse_with = until_eof)]
    pub entries: Vec<HedEntry>,
}

impl HedFile {
    /// Parses an index from `buffer`. A partial record at the end means the file was truncated.
    pub fn from_existing(buffer: ByteSpan) -> BinResult<HedFile> {
        if buffer.len() % HED_ENTRY_SIZE != 0 {
            return Err(binrw::Error::AssertFail {
                pos: (buffer.len() - buffer.len() % HED_ENTRY_SIZE) as u64,
                message: format!(
                    "index is {} bytes long, which is not a multiple of the {HED_ENTRY_SIZE} byte record size",
                    buffer.len()
                ),
            });
        }

        let mut cursor = Cursor::new(buffer);
        HedFile::read(&mut cursor)
    }
}
