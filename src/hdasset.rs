// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::io::{Cursor, Read};

use binrw::{binread, BinRead};
use thiserror::Error;
use tracing::{trace, warn};

use crate::compression::{zlib_decompress, InflateError};
use crate::{ByteBuffer, ByteSpan};

/// Size of the fixed header at the start of every HD asset.
const HEADER_SIZE: usize = 0x10;

/// Size of each remastered section header.
const REMASTERED_HEADER_SIZE: usize = 0x30;

/// No asset has anywhere near this many remastered sections, anything larger is a broken header.
pub const MAX_REMASTERED_SECTIONS: i32 = 0x10000;

/// How a section is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionStorage {
    /// The bytes are stored as-is.
    Raw,
    /// The bytes are a zlib stream of this size.
    Zlib { stored_length: u32 },
}

impl SectionStorage {
    // a negative stored length marks uncompressed data
    fn from_stored_length(stored_length: i32) -> Self {
        match u32::try_from(stored_length) {
            Ok(stored_length) => SectionStorage::Zlib { stored_length },
            Err(_) => SectionStorage::Raw,
        }
    }
}

#[binread]
#[derive(Debug)]
#[br(little)]
struct HdAssetHeader {
    #[br(assert(decompressed_length >= 0, "negative original length {}", decompressed_length))]
    decompressed_length: i32,
    #[br(assert(
        (0..=MAX_REMASTERED_SECTIONS).contains(&remastered_count),
        "invalid remastered section count {}",
        remastered_count
    ))]
    remastered_count: i32,
    #[br(map = SectionStorage::from_stored_length)]
    #[br(pad_after = 4)]
    storage: SectionStorage,
}

#[binread]
#[derive(Debug)]
#[br(little)]
struct RemasteredHeader {
    #[br(map = |x: [u8; 0x20]| read_name(&x))]
    name: String,
    /// Where the texture was in the original file, we have no use for it.
    #[allow(dead_code)]
    original_offset: i32,
    #[br(pad_before = 4)]
    decompressed_length: i32,
    #[br(map = SectionStorage::from_stored_length)]
    storage: SectionStorage,
}

fn read_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// The header or original section of an HD asset couldn't be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid header: {0}")]
    Header(String),
    #[error("unable to read the original section: {0}")]
    Read(#[from] std::io::Error),
    #[error("the original section does not inflate to {expected} bytes")]
    LengthMismatch { expected: usize },
    #[error("the original section is not a valid zlib stream")]
    Decompression,
}

/// Why a single remastered section was skipped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubAssetFailureReason {
    #[error("the section is not a valid zlib stream")]
    Decompression,
    #[error("the section does not inflate to {expected} bytes")]
    SizeMismatch { expected: usize },
    #[error("the section has a negative length")]
    InvalidLength,
    #[error("unsafe or empty name")]
    InvalidName,
    #[error("another section already uses this name")]
    DuplicateName,
    #[error("the asset ends before the section does")]
    Truncated,
    #[error("an earlier section has an unknown size, so this one can't be located")]
    Misaligned,
}

/// A remastered section that couldn't be decoded. The rest of the asset is still usable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{name}: {reason}")]
pub struct SubAssetFailure {
    pub name: String,
    pub reason: SubAssetFailureReason,
}

/// An asset entry split into its original data and remastered sections.
#[derive(Debug, Default)]
pub struct HdAsset {
    /// The data as the original release shipped it.
    pub original_data: ByteBuffer,
    /// Remastered sections keyed by their name. Empty if the asset has none.
    pub remastered_assets: HashMap<String, ByteBuffer>,
    /// Remastered sections that were skipped.
    pub failed_assets: Vec<SubAssetFailure>,
}

impl HdAsset {
    /// Decodes an asset from `buffer`.
    pub fn from_existing(buffer: ByteSpan) -> Result<HdAsset, DecodeError> {
        Self::read_from(Cursor::new(buffer))
    }

    /// Decodes an asset, consuming only as much of `reader` as the asset needs.
    pub fn read_from<R: Read>(mut reader: R) -> Result<HdAsset, DecodeError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let header = HdAssetHeader::read(&mut Cursor::new(&header_bytes))
            .map_err(|err| DecodeError::Header(err.to_string()))?;

        let section_headers_length = header.remastered_count as usize * REMASTERED_HEADER_SIZE;
        let section_header_bytes = read_exact_bounded(&mut reader, section_headers_length)?;

        let mut cursor = Cursor::new(&section_header_bytes);
        let section_headers = (0..header.remastered_count)
            .map(|_| RemasteredHeader::read(&mut cursor))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DecodeError::Header(err.to_string()))?;

        let expected = header.decompressed_length as usize;
        let original_data = match header.storage {
            SectionStorage::Raw => read_exact_bounded(&mut reader, expected)?,
            SectionStorage::Zlib { stored_length } => {
                let mut compressed = read_exact_bounded(&mut reader, stored_length as usize)?;
                zlib_decompress(&mut compressed, expected).map_err(|err| match err {
                    InflateError::Invalid => DecodeError::Decompression,
                    InflateError::LengthMismatch => DecodeError::LengthMismatch { expected },
                })?
            }
        };

        let mut asset = HdAsset {
            original_data,
            ..Default::default()
        };

        let mut aligned = true;
        for section in section_headers {
            let result = if aligned {
                read_section(&mut reader, &section)
            } else {
                Err(SubAssetFailureReason::Misaligned)
            };

            // a raw section with a negative length has no known extent
            if section.storage == SectionStorage::Raw && section.decompressed_length < 0 {
                aligned = false;
            }

            match result.and_then(|data| {
                validate_name(&section.name, &asset.remastered_assets)?;
                Ok(data)
            }) {
                Ok(data) => {
                    trace!(name = %section.name, length = data.len(), "Decoded remastered section");
                    asset.remastered_assets.insert(section.name, data);
                }
                Err(reason) => {
                    warn!(name = %section.name, %reason, "Skipping remastered section");
                    asset.failed_assets.push(SubAssetFailure {
                        name: section.name,
                        reason,
                    });
                }
            }
        }

        Ok(asset)
    }
}

fn read_section<R: Read>(
    reader: &mut R,
    section: &RemasteredHeader,
) -> Result<ByteBuffer, SubAssetFailureReason> {
    let expected = usize::try_from(section.decompressed_length);

    match section.storage {
        SectionStorage::Raw => {
            let expected = expected.map_err(|_| SubAssetFailureReason::InvalidLength)?;
            read_exact_bounded(reader, expected).map_err(|_| SubAssetFailureReason::Truncated)
        }
        SectionStorage::Zlib { stored_length } => {
            // consume the stored bytes first, so the next section stays aligned
            let mut compressed = read_exact_bounded(reader, stored_length as usize)
                .map_err(|_| SubAssetFailureReason::Truncated)?;
            let expected = expected.map_err(|_| SubAssetFailureReason::InvalidLength)?;

            zlib_decompress(&mut compressed, expected).map_err(|err| match err {
                InflateError::Invalid => SubAssetFailureReason::Decompression,
                InflateError::LengthMismatch => SubAssetFailureReason::SizeMismatch { expected },
            })
        }
    }
}

/// Section names become file names, so they can't leave the folder they're written to.
fn validate_name(
    name: &str,
    existing: &HashMap<String, ByteBuffer>,
) -> Result<(), SubAssetFailureReason> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(SubAssetFailureReason::InvalidName);
    }

    if existing.contains_key(name) {
        return Err(SubAssetFailureReason::DuplicateName);
    }

    Ok(())
}

/// Reads exactly `length` bytes, without trusting `length` enough to allocate it up front.
fn read_exact_bounded<R: Read>(reader: &mut R, length: usize) -> std::io::Result<ByteBuffer> {
    let mut buffer = ByteBuffer::new();
    reader.by_ref().take(length as u64).read_to_end(&mut buffer)?;

    if buffer.len() != length {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {length} bytes, but only {} were left", buffer.len()),
        ));
    }

    Ok(buffer)
}
