// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Cursor;

use binrw::{binread, BinRead, BinResult};
use modular_bitfield::prelude::*;

use crate::ByteSpan;

use super::{ContainerEntry, EntryHash, EntryLocation, SECTOR_SIZE};

/// Size of a single IDX record.
const IDX_ENTRY_SIZE: u64 = 0x10;

#[bitfield]
#[binread]
#[br(map = Self::from_bytes)]
#[derive(Clone, Copy, Debug)]
pub struct IdxBlockInfo {
    /// Number of sectors the entry occupies, minus one.
    pub block_count: B14,
    /// The entry is stored with the disc's own compression.
    pub compressed: bool,
    /// The entry is streamed (audio, movies) instead of loaded at once.
    pub streamed: bool,
}

#[binread]
#[derive(Debug)]
#[br(little)]
pub struct IdxEntry {
    pub hash32: u32,
    pub hash16: u16,
    pub block_info: IdxBlockInfo,
    /// Sector relative to the start of the IMG.
    pub block: u32,
    /// Size of the file once it's decompressed.
    pub length: u32,
}

impl IdxEntry {
    /// How many bytes the entry takes up inside of the IMG.
    pub fn stored_length(&self) -> u64 {
        if self.block_info.compressed() {
            (self.block_info.block_count() as u64 + 1) * SECTOR_SIZE
        } else {
            self.length as u64
        }
    }
}

impl From<&IdxEntry> for ContainerEntry {
    fn from(entry: &IdxEntry) -> Self {
        ContainerEntry {
            hash: EntryHash::Disc {
                hash32: entry.hash32,
                hash16: entry.hash16,
            },
            location: EntryLocation::Sector(entry.block),
            stored_length: Some(entry.stored_length()),
        }
    }
}

/// A disc index, which is a counted list of fixed size records.
#[binread]
#[derive(Debug)]
#[br(little, import(region_length: u64))]
pub struct IdxFile {
    #[br(temp)]
    #[br(assert(
        4 + count as u64 * IDX_ENTRY_SIZE <= region_length,
        "index declares {} entries, but only {} bytes are available",
        count,
        region_length
    ))]
    count: u32,

    #[br(count = count)]
    pub entries: Vec<IdxEntry>,
}

impl IdxFile {
    /// Parses an index from `buffer`. Anything after the last record is ignored, disc images pad
    /// the file to a full sector.
    pub fn from_existing(buffer: ByteSpan) -> BinResult<IdxFile> {
        let mut cursor = Cursor::new(buffer);
        IdxFile::read_args(&mut cursor, (buffer.len() as u64,))
    }
}
