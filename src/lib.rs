// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Represents a continuous block of memory which is not owned, and comes either from an in-memory location or from a file.
pub type ByteSpan<'a> = &'a [u8];

/// Represents a continuous block of memory which is owned.
pub type ByteBuffer = Vec<u8>;

/// Errors shared by every part of the crate.
pub mod error;
pub use error::Error;

/// Reading index and data containers from both the disc and digital releases.
pub mod container;

/// Locating files inside of an ISO 9660 disc image.
pub mod iso;

/// Decoding HD assets, which bundle the original file with remastered resources.
pub mod hdasset;

/// Turning content hashes back into readable file paths.
pub mod names;

/// Extracting whole titles onto disk.
pub mod extract;

/// Known titles and where their containers live.
pub mod title;

/// Configuration for extraction jobs.
pub mod config;

mod compression;
mod crc;
